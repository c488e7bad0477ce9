//! Scrape and clone orchestration.
//!
//! A clone moves through `Idle → Capturing → Extracting → Composing →
//! Generating → Done`, or stops at `Failed(stage, reason)` on the first error.
//! Nothing is returned from a failed run. Capture and generation each run
//! under their own deadline, and both deadlines are clipped to the overall
//! clone deadline so the stage that ran out of time is always known.

use crate::capture::PageCapturer;
use crate::extract;
use crate::llm::Generator;
use crate::prompt;
use crate::{Error, PageContext, PipelineConfig, Result, Stage};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use url::Url;

type OnStageHandler = Arc<dyn Fn(&PipelineState) + Send + Sync>;

/// Where a pipeline run currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Extracting,
    Composing,
    Generating,
    Done,
    Failed { stage: Stage, reason: String },
}

/// Result of the scrape operation, shaped for adapters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub status: String,
    pub url: String,
    pub scraper_used: String,
    pub html: String,
    pub css_links: Vec<String>,
    pub images: Vec<String>,
    /// Base64 PNG
    pub screenshot: Option<String>,
    pub inline_styles: Vec<String>,
    pub scripts: Vec<String>,
    pub meta_tags: Vec<BTreeMap<String, String>>,
    pub processing_time_seconds: f64,
}

impl ScrapeReport {
    fn new(url: &Url, scraper_used: &str, ctx: PageContext, elapsed: Duration) -> Self {
        let screenshot = ctx.screenshot_base64();
        Self {
            status: "success".to_string(),
            url: url.to_string(),
            scraper_used: scraper_used.to_string(),
            html: ctx.html,
            css_links: ctx.css_links,
            images: ctx.images,
            screenshot,
            inline_styles: ctx.inline_styles,
            scripts: ctx.scripts,
            meta_tags: ctx.meta_tags,
            processing_time_seconds: elapsed.as_secs_f64(),
        }
    }
}

/// Result of the clone operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneReport {
    pub cloned_html: String,
}

/// Capture → extract → compose → generate, with deadlines
pub struct Pipeline<C, G> {
    capturer: C,
    generator: G,
    config: PipelineConfig,
    on_stage: Option<OnStageHandler>,
}

impl<C: PageCapturer> Pipeline<C, ()> {
    /// Build a pipeline that can only scrape.
    pub fn scrape_only(capturer: C, config: PipelineConfig) -> Result<Self> {
        Self::new(capturer, (), config)
    }
}

impl<C: PageCapturer, G> Pipeline<C, G> {
    /// Build a pipeline, rejecting deadlines that leave the capturer no room
    /// to report its own navigation timeout.
    pub fn new(capturer: C, generator: G, config: PipelineConfig) -> Result<Self> {
        config.validate(capturer.navigation_timeout())?;
        Ok(Self {
            capturer,
            generator,
            config,
            on_stage: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Register a callback invoked on every state transition.
    pub fn on_stage<F>(&mut self, cb: F)
    where
        F: Fn(&PipelineState) + Send + Sync + 'static,
    {
        self.on_stage = Some(Arc::new(cb));
    }

    /// Remove previously registered on_stage callback if any
    pub fn clear_on_stage(&mut self) {
        self.on_stage = None;
    }

    /// Capture and extract `url`, bounded by the capture deadline.
    pub async fn scrape(&self, url: &str) -> Result<ScrapeReport> {
        let started = Instant::now();
        info!("Received scrape request for URL: {}", url);
        self.transition(PipelineState::Idle);

        let outcome = async {
            let target = parse_target(url)?;
            let deadline = started + self.config.capture_deadline;
            let ctx = self.capture_context(&target, deadline).await?;
            Ok::<_, Error>((target, ctx))
        }
        .await;

        let (target, ctx) = self.finish(outcome)?;
        let report = ScrapeReport::new(&target, self.capturer.name(), ctx, started.elapsed());
        info!("Total scrape processing time: {:.2} seconds", report.processing_time_seconds);
        Ok(report)
    }

    async fn capture_context(&self, target: &Url, deadline: Instant) -> Result<PageContext> {
        self.transition(PipelineState::Capturing);

        let started = Instant::now();
        let capture = timeout_at(deadline, self.capturer.capture(target))
            .await
            .map_err(|_| {
                let elapsed = started.elapsed();
                error!(
                    "Capture of {} exceeded its deadline after {:.2} seconds",
                    target,
                    elapsed.as_secs_f64()
                );
                Error::CaptureTimeout {
                    after_ms: elapsed.as_millis() as u64,
                }
            })??;

        self.transition(PipelineState::Extracting);
        extract::extract_capture(capture, target)
    }

    fn finish<T>(&self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.transition(PipelineState::Done);
                Ok(value)
            }
            Err(e) => {
                error!("{} stage failed: {}", e.stage(), e);
                self.transition(PipelineState::Failed {
                    stage: e.stage(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn transition(&self, state: PipelineState) {
        debug!("pipeline state: {:?}", state);
        if let Some(cb) = &self.on_stage {
            cb(&state);
        }
    }
}

impl<C: PageCapturer, G: Generator> Pipeline<C, G> {
    /// Run the full pipeline and return the generated replica.
    pub async fn clone_page(&self, url: &str) -> Result<CloneReport> {
        let started = Instant::now();
        let clone_deadline = started + self.config.clone_deadline;
        info!("Received clone request for URL: {}", url);
        self.transition(PipelineState::Idle);

        let outcome = async {
            let target = parse_target(url)?;

            let capture_deadline = clone_deadline.min(Instant::now() + self.config.capture_deadline);
            let ctx = self.capture_context(&target, capture_deadline).await?;

            self.transition(PipelineState::Composing);
            let prompt = prompt::compose(&ctx.generation_context());
            // Context is no longer needed once the prompt exists
            drop(ctx);

            self.transition(PipelineState::Generating);
            let generation_deadline =
                clone_deadline.min(Instant::now() + self.config.generation_deadline);
            let generation_started = Instant::now();
            let document = timeout_at(generation_deadline, self.generator.generate(&prompt))
                .await
                .map_err(|_| Error::RequestFailed {
                    status: None,
                    message: format!(
                        "generation timed out after {}ms",
                        generation_started.elapsed().as_millis()
                    ),
                })??;

            if !document.starts_with_doctype() {
                warn!("Generated document for {} does not start with a doctype", target);
            }
            if !document.has_document_structure() {
                warn!("Generated document for {} is missing <head> or <body>", target);
            }
            Ok::<_, Error>(document)
        }
        .await;

        let document = self.finish(outcome)?;
        info!(
            "Clone of {} finished in {:.2} seconds",
            url,
            started.elapsed().as_secs_f64()
        );
        Ok(CloneReport {
            cloned_html: document.into_string(),
        })
    }
}

/// Accept only absolute http(s) URLs as capture targets.
pub fn parse_target(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| Error::CaptureError(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::CaptureError(format!(
            "Unsupported URL scheme '{}' in '{}'",
            other, url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://example.com").is_ok());
        assert!(parse_target("  http://localhost:8080/a?b=c ").is_ok());
        assert!(matches!(parse_target("example.com"), Err(Error::CaptureError(_))));
        assert!(matches!(parse_target("file:///etc/passwd"), Err(Error::CaptureError(_))));
    }

    #[test]
    fn test_scrape_report_field_names() {
        let ctx = PageContext {
            html: "<html></html>".into(),
            screenshot: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let url = Url::parse("https://example.com").unwrap();
        let report = ScrapeReport::new(&url, "stub", ctx, Duration::from_millis(1500));
        let json = serde_json::to_value(&report).unwrap();

        for key in [
            "status",
            "url",
            "scraperUsed",
            "html",
            "cssLinks",
            "images",
            "screenshot",
            "inlineStyles",
            "scripts",
            "metaTags",
            "processingTimeSeconds",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["screenshot"], "AQID");
        assert_eq!(json["processingTimeSeconds"], 1.5);
        assert_eq!(json["url"], "https://example.com/");
    }

    #[test]
    fn test_clone_report_field_name() {
        let report = CloneReport {
            cloned_html: "<!DOCTYPE html>".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["clonedHtml"], "<!DOCTYPE html>");
    }
}
