//! Chrome DevTools Protocol capture backend

use crate::capture::{run_on_worker, PageCapturer};
use crate::{CaptureConfig, Error, PageCapture, Result};
use async_trait::async_trait;
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::util::Wait;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use url::Url;

/// Expression that is true once the navigated document has passed DOMContentLoaded.
const DOM_READY_PROBE: &str =
    "location.href !== 'about:blank' && document.readyState !== 'loading'";

/// Captures pages with a fresh headless Chrome per call (uses the `headless_chrome` crate)
///
/// No browser state is shared between captures: every call launches its own
/// process and tears it down before returning.
#[derive(Debug, Clone, Default)]
pub struct CdpCapturer {
    config: CaptureConfig,
}

impl CdpCapturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

#[async_trait]
impl PageCapturer for CdpCapturer {
    fn name(&self) -> &str {
        "chromium-cdp"
    }

    fn navigation_timeout(&self) -> Duration {
        self.config.navigation_timeout
    }

    async fn capture(&self, url: &Url) -> Result<PageCapture> {
        let config = self.config.clone();
        let url = url.to_string();
        run_on_worker("cdp", move || capture_blocking(&config, &url)).await
    }
}

/// A launched browser with a single tab.
///
/// The Chrome process is killed when the session is dropped, so holding the
/// session in a scope is enough to guarantee teardown on every exit path,
/// including panics and early returns.
pub struct BrowserSession {
    tab: Arc<Tab>,
    browser: Browser,
    launched_at: Instant,
}

impl BrowserSession {
    /// Launch Chrome and open the tab used for the capture.
    pub fn launch(config: &CaptureConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .build()
            .map_err(|e| Error::CaptureError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CaptureError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::CaptureError(format!("Failed to create tab: {}", e)))?;

        // Every driver call made through this tab is bounded by the navigation timeout
        tab.set_default_timeout(config.navigation_timeout);

        if let Some(user_agent) = &config.user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| Error::CaptureError(format!("Failed to set user agent: {}", e)))?;
        }

        debug!("browser launched");
        Ok(Self {
            tab,
            browser,
            launched_at: Instant::now(),
        })
    }

    /// Acquire a session, run `f` with it and always release the browser.
    pub fn scoped<T, F>(config: &CaptureConfig, f: F) -> Result<T>
    where
        F: FnOnce(&BrowserSession) -> Result<T>,
    {
        let session = Self::launch(config)?;
        f(&session)
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Navigate and block until the document is DOM-ready or `timeout` elapses.
    pub fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();

        self.tab
            .navigate_to(url)
            .map_err(|e| navigation_error(e, started.elapsed(), timeout))?;

        let remaining = timeout.saturating_sub(started.elapsed());
        Wait::with_timeout(remaining)
            .until(|| {
                self.tab
                    .evaluate(DOM_READY_PROBE, false)
                    .ok()
                    .and_then(|obj| obj.value)
                    .and_then(|v| v.as_bool())
                    .and_then(|ready| ready.then_some(()))
            })
            .map_err(|_| Error::CaptureTimeout {
                after_ms: started.elapsed().as_millis() as u64,
            })?;

        debug!("{} reached DOM-ready in {:?}", url, started.elapsed());
        Ok(())
    }

    /// Serialized markup of the rendered document.
    pub fn content(&self) -> Result<String> {
        let html = self
            .tab
            .get_content()
            .map_err(|e| Error::CaptureError(format!("Failed to read page content: {}", e)))?;

        if html.trim().is_empty() {
            return Err(Error::CaptureError("Rendered document is empty".into()));
        }
        Ok(html)
    }

    /// PNG screenshot of the whole document (or just the viewport).
    pub fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        if full_page {
            match self.full_page_screenshot() {
                Ok(png) => return Ok(png),
                Err(e) => warn!("Full-page screenshot failed, falling back to viewport: {}", e),
            }
        }

        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)))
    }

    fn full_page_screenshot(&self) -> Result<Vec<u8>> {
        let metrics = self
            .tab
            .call_method(Page::GetLayoutMetrics(None))
            .map_err(|e| Error::CaptureError(format!("Failed to read layout metrics: {}", e)))?;

        let size = metrics.css_content_size;
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
            scale: 1.0,
        };

        let shot = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip: Some(clip),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: None,
            })
            .map_err(|e| Error::CaptureError(format!("Screenshot failed: {}", e)))?;

        base64::engine::general_purpose::STANDARD
            .decode(shot.data)
            .map_err(|e| Error::CaptureError(format!("Screenshot payload is not base64: {}", e)))
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Dropping `browser` kills the Chrome child process
        debug!(
            "tearing down browser (pid {:?}) after {:?}",
            self.browser.get_process_id(),
            self.launched_at.elapsed()
        );
    }
}

/// One full capture pass: launch, navigate, snapshot, screenshot, tear down.
pub fn capture_blocking(config: &CaptureConfig, url: &str) -> Result<PageCapture> {
    let started = Instant::now();
    info!("Capturing {}", url);

    let (html, screenshot) = BrowserSession::scoped(config, |session| {
        session.navigate(url, config.navigation_timeout)?;
        let html = session.content()?;

        // The screenshot is best-effort; a missing one does not fail the capture
        let screenshot = match session.screenshot(config.full_page_screenshot) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Continuing without screenshot for {}: {}", url, e);
                None
            }
        };
        Ok((html, screenshot))
    })?;

    let duration = started.elapsed();
    info!(
        "Captured {} in {:.2}s ({} bytes of HTML, screenshot: {})",
        url,
        duration.as_secs_f64(),
        html.len(),
        screenshot.as_ref().map(|s| s.len().to_string()).unwrap_or_else(|| "none".into())
    );

    Ok(PageCapture {
        html,
        screenshot,
        captured_at: SystemTime::now(),
        duration,
    })
}

fn navigation_error(err: impl std::fmt::Display, elapsed: Duration, timeout: Duration) -> Error {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if elapsed >= timeout || lower.contains("timeout") || lower.contains("timed out") {
        Error::CaptureTimeout {
            after_ms: elapsed.as_millis() as u64,
        }
    } else {
        Error::CaptureError(format!("Navigation failed: {}", message))
    }
}
