//! Sitecloner
//!
//! Captures a live rendering of a page in headless Chrome, extracts a
//! structured page context from it and asks a generative model for a static,
//! self-contained replica of the page.
//!
//! # Pipeline
//!
//! - **Capture**: [`PageCapturer`] loads the URL in an isolated browser and
//!   returns the rendered DOM plus a best-effort full-page screenshot
//! - **Extract**: [`extract::extract`] derives stylesheets, images, inline
//!   styles, scripts and meta tags from the captured markup
//! - **Compose**: [`prompt::compose`] turns the context into a single prompt
//! - **Generate**: [`GenerationClient`] sends the prompt to the model and
//!   validates what comes back
//!
//! "Scrape" stops after extraction, "clone" runs all four stages.
//!
//! # Example
//!
//! ```no_run
//! use sitecloner::{GenerationClient, GenerationConfig, Pipeline, PipelineConfig};
//! use sitecloner::cdp::CdpCapturer;
//!
//! # async fn run() -> sitecloner::Result<()> {
//! let capturer = CdpCapturer::new(Default::default());
//! let generator = GenerationClient::new(GenerationConfig::from_env())?;
//! let pipeline = Pipeline::new(capturer, generator, PipelineConfig::default())?;
//!
//! let report = pipeline.clone_page("https://example.com").await?;
//! println!("{}", report.cloned_html);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use base64::Engine as Base64Engine;

pub mod error;
pub use error::{Error, Result, Stage};

pub mod capture;
pub use capture::PageCapturer;

// Chrome DevTools Protocol capture backend
#[cfg(feature = "cdp")]
pub mod cdp;

pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod prompt;

pub use llm::{GenerationClient, Generator};
pub use pipeline::{CloneReport, Pipeline, PipelineState, ScrapeReport};

/// Browser window dimensions used while capturing
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Configuration for page capture
///
/// `navigation_timeout` is the capturer's own deadline for reaching DOM-ready.
/// The pipeline wraps each capture in an outer deadline that must be strictly
/// longer (see [`PipelineConfig::capture_deadline`]).
///
/// # Examples
///
/// ```
/// let cfg = sitecloner::CaptureConfig::default();
/// assert_eq!(cfg.navigation_timeout.as_secs(), 15);
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Deadline for navigation to reach DOM content loaded
    pub navigation_timeout: Duration,
    /// Browser window size
    pub viewport: Viewport,
    /// User agent override; the browser default is used when `None`
    pub user_agent: Option<String>,
    /// Explicit Chrome binary; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Run Chrome with its sandbox enabled
    pub sandbox: bool,
    /// Capture the whole document rather than just the viewport
    pub full_page_screenshot: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(15),
            viewport: Viewport::default(),
            user_agent: None,
            chrome_path: None,
            sandbox: true,
            full_page_screenshot: true,
        }
    }
}

/// Environment variable holding the generation credential
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Optional override of the generation endpoint base URL
pub const ENDPOINT_ENV: &str = "SITECLONER_GENERATION_ENDPOINT";
/// Optional override of the generation model
pub const MODEL_ENV: &str = "SITECLONER_MODEL";

/// Configuration for the remote generation service
#[derive(Clone)]
pub struct GenerationConfig {
    /// Credential for the generation service; generation fails without it
    pub api_key: Option<String>,
    /// Base URL of the API, without the `/models/...` suffix
    pub endpoint: String,
    /// Model name used in the request path
    pub model: String,
    /// Timeout applied to the single outbound call
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl GenerationConfig {
    /// Load the credential and optional overrides from the process environment.
    ///
    /// A blank `GEMINI_API_KEY` is treated the same as an unset one.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GenerationConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self {
            api_key: non_blank(API_KEY_ENV),
            ..Default::default()
        };
        if let Some(endpoint) = non_blank(ENDPOINT_ENV) {
            config.endpoint = endpoint;
        }
        if let Some(model) = non_blank(MODEL_ENV) {
            config.model = model;
        }
        config
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Deadlines enforced by the [`Pipeline`] around each stage
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Outer deadline around capture; must exceed the capturer's navigation timeout
    pub capture_deadline: Duration,
    /// Deadline around the generation call
    pub generation_deadline: Duration,
    /// Deadline for a whole clone operation; every stage deadline is clipped to it
    pub clone_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_deadline: Duration::from_secs(18),
            generation_deadline: Duration::from_secs(65),
            clone_deadline: Duration::from_secs(90),
        }
    }
}

impl PipelineConfig {
    /// Check the deadlines against the capturer's inner navigation timeout.
    pub fn validate(&self, navigation_timeout: Duration) -> Result<()> {
        if self.capture_deadline <= navigation_timeout {
            return Err(Error::ConfigError(format!(
                "capture deadline ({}ms) must be longer than the navigation timeout ({}ms)",
                self.capture_deadline.as_millis(),
                navigation_timeout.as_millis()
            )));
        }
        if self.clone_deadline < self.capture_deadline {
            return Err(Error::ConfigError(format!(
                "clone deadline ({}ms) is shorter than the capture deadline ({}ms)",
                self.clone_deadline.as_millis(),
                self.capture_deadline.as_millis()
            )));
        }
        if self.generation_deadline.is_zero() {
            return Err(Error::ConfigError("generation deadline must be non-zero".into()));
        }
        Ok(())
    }
}

/// Raw output of one capture pass
#[derive(Debug, Clone)]
pub struct PageCapture {
    /// Serialized rendered DOM
    pub html: String,
    /// Screenshot bytes (PNG); `None` when the screenshot failed
    pub screenshot: Option<Vec<u8>>,
    /// When the capture finished
    pub captured_at: SystemTime,
    /// Time spent launching, navigating and snapshotting
    pub duration: Duration,
}

/// Structured projection of a capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContext {
    pub html: String,
    /// Absolute stylesheet URLs in document order
    pub css_links: Vec<String>,
    /// Absolute image URLs in document order
    pub images: Vec<String>,
    pub inline_styles: Vec<String>,
    /// Script text, kept for reporting only
    pub scripts: Vec<String>,
    pub meta_tags: Vec<BTreeMap<String, String>>,
    pub screenshot: Option<Vec<u8>>,
}

impl PageContext {
    /// Build the read-only projection used for prompting.
    pub fn generation_context(&self) -> GenerationRequestContext<'_> {
        GenerationRequestContext {
            html: &self.html,
            css_links: &self.css_links,
            images: &self.images,
            screenshot_base64: self.screenshot_base64(),
        }
    }

    pub fn screenshot_base64(&self) -> Option<String> {
        self.screenshot
            .as_ref()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// The subset of a [`PageContext`] a prompt is built from
#[derive(Debug, Clone)]
pub struct GenerationRequestContext<'a> {
    pub html: &'a str,
    pub css_links: &'a [String],
    pub images: &'a [String],
    pub screenshot_base64: Option<String>,
}

/// Markup returned by the generation service, guaranteed non-blank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument(String);

impl GeneratedDocument {
    /// Wrap generated text, rejecting blank output.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::EmptyOutput);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether the text opens with a `<!DOCTYPE html>` declaration.
    pub fn starts_with_doctype(&self) -> bool {
        self.0
            .trim_start()
            .get(..9)
            .map(|head| head.eq_ignore_ascii_case("<!doctype"))
            .unwrap_or(false)
    }

    /// Whether both `<head` and `<body` markers are present.
    pub fn has_document_structure(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.contains("<head") && lower.contains("<body")
    }
}

impl std::fmt::Display for GeneratedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_configs() {
        let capture = CaptureConfig::default();
        assert_eq!(capture.viewport.width, 1280);
        assert_eq!(capture.viewport.height, 720);
        assert!(capture.full_page_screenshot);

        let pipeline = PipelineConfig::default();
        assert!(pipeline.validate(capture.navigation_timeout).is_ok());
        assert!(pipeline.capture_deadline > capture.navigation_timeout);
    }

    #[test]
    fn test_equal_deadlines_are_rejected() {
        let pipeline = PipelineConfig {
            capture_deadline: Duration::from_secs(15),
            ..Default::default()
        };
        let err = pipeline.validate(Duration::from_secs(15)).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_generation_config_from_lookup() {
        let mut env = HashMap::new();
        env.insert(API_KEY_ENV, "  secret ");
        env.insert(MODEL_ENV, "gemini-test");
        let config = GenerationConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model, "gemini-test");
        assert!(config.endpoint.starts_with("https://generativelanguage.googleapis.com"));
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let config = GenerationConfig::from_lookup(|k| (k == API_KEY_ENV).then(|| "   ".to_string()));
        assert!(!config.has_credential());
    }

    #[test]
    fn test_generated_document_validation() {
        assert!(matches!(GeneratedDocument::new(" \n\t"), Err(Error::EmptyOutput)));

        let doc = GeneratedDocument::new("\n<!DOCTYPE html><html><head></head><body></body></html>").unwrap();
        assert!(doc.starts_with_doctype());
        assert!(doc.has_document_structure());

        let fragment = GeneratedDocument::new("<div>hi</div>").unwrap();
        assert!(!fragment.starts_with_doctype());
        assert!(!fragment.has_document_structure());
    }

    #[test]
    fn test_generation_context_projection() {
        let ctx = PageContext {
            html: "<html></html>".into(),
            css_links: vec!["https://a.test/s.css".into()],
            screenshot: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let projected = ctx.generation_context();
        assert_eq!(projected.html, "<html></html>");
        assert_eq!(projected.css_links.len(), 1);
        assert_eq!(projected.screenshot_base64.as_deref(), Some("AQID"));
    }
}
