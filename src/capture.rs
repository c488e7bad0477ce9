//! Page capture seam.
//!
//! Browser drivers used here are blocking, so a capture runs on its own
//! worker thread and hands the result back through a oneshot channel. The
//! async side can be cancelled (dropped) at any time; the worker keeps
//! running until its own navigation timeout fires and then releases the
//! browser on that thread.

use crate::{Error, PageCapture, Result};
use async_trait::async_trait;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;

/// Something that can render a URL and snapshot it.
#[async_trait]
pub trait PageCapturer: Send + Sync {
    /// Short identifier reported as `scraperUsed`
    fn name(&self) -> &str;

    /// The capturer's own deadline for reaching DOM-ready
    fn navigation_timeout(&self) -> Duration;

    /// Load `url` and return the rendered markup and screenshot.
    async fn capture(&self, url: &Url) -> Result<PageCapture>;
}

#[async_trait]
impl<T: PageCapturer + ?Sized> PageCapturer for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn navigation_timeout(&self) -> Duration {
        (**self).navigation_timeout()
    }

    async fn capture(&self, url: &Url) -> Result<PageCapture> {
        (**self).capture(url).await
    }
}

/// Run a blocking capture job on a dedicated thread and await its result.
pub async fn run_on_worker<T, F>(label: &str, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    thread::Builder::new()
        .name(format!("capture-{}", label))
        .spawn(move || {
            let res = job();
            // Receiver is gone when the caller's deadline already fired
            if tx.send(res).is_err() {
                log::debug!("capture finished after the caller stopped waiting");
            }
        })
        .map_err(|e| Error::CaptureError(format!("Failed to spawn capture worker: {}", e)))?;

    rx.await
        .map_err(|_| Error::CaptureError("Capture worker exited without a result".into()))?
}
