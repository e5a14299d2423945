use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use iris_core::error::AppError;
use iris_core::traits::Fetcher;
use tokio::sync::Mutex;

/// How long a running browser may take to answer the liveness check.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Renders JavaScript before returning the HTML, for pages that build their
/// tables client-side.
///
/// The browser is launched by the first [`Fetcher::connect`] and then shared
/// by every clone. Each later `connect` checks that it still answers; a dead
/// browser fails that batch and is relaunched on the next one. Each fetch
/// opens a tab, grabs the rendered DOM and closes the tab, also when the
/// fetch fails or times out.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Mutex<Option<Arc<Browser>>>>,
    timeout: Duration,
    scan_full_page: bool,
    scroll_delay: Duration,
}

impl BrowserFetcher {
    /// Fetcher with a **30 s** navigation timeout. Nothing is launched yet.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            browser: Arc::new(Mutex::new(None)),
            timeout,
            scan_full_page: false,
            scroll_delay: Duration::from_millis(500),
        }
    }

    /// Scroll each page to the bottom before reading it, so lazy-loaded
    /// rows are rendered.
    pub fn scan_full_page(mut self, scroll_delay: Duration) -> Self {
        self.scan_full_page = true;
        self.scroll_delay = scroll_delay;
        self
    }

    async fn launch() -> Result<Browser, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::NetworkError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// The shared browser, launching one if none is running.
    async fn browser(&self) -> Result<Arc<Browser>, AppError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(Arc::clone(browser));
        }
        let browser = Arc::new(Self::launch().await?);
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    async fn render(&self, page: Page, url: String) -> Result<String, AppError> {
        page.goto(url.as_str())
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;

        page.find_element("body")
            .await
            .map_err(|e| AppError::HttpError(format!("Page did not render body: {e}")))?;

        if self.scan_full_page {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to scroll {url}: {e}")))?;
            tokio::time::sleep(self.scroll_delay).await;
        }

        page.content()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))
    }
}

impl Default for BrowserFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for BrowserFetcher {
    async fn connect(&self) -> Result<(), AppError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            let error = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, browser.version()).await
            {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no answer within {}s", HEALTH_CHECK_TIMEOUT.as_secs()),
            };
            tracing::warn!(%error, "Browser stopped responding, relaunching on next batch");
            *slot = None;
            return Err(AppError::NetworkError(format!(
                "Browser stopped responding: {error}"
            )));
        }

        *slot = Some(Arc::new(Self::launch().await?));
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to open tab: {e}")))?;

        let work = self.render(page.clone(), url.to_string());
        let close = async move {
            if let Err(e) = page.close().await {
                tracing::debug!(error = %e, "Failed to close tab");
            }
        };
        bounded_then(self.timeout, work, close).await
    }
}

/// Run `work` for at most `limit`, then run `cleanup` whatever the outcome.
async fn bounded_then<T, W, C>(limit: Duration, work: W, cleanup: C) -> Result<T, AppError>
where
    W: Future<Output = Result<T, AppError>>,
    C: Future<Output = ()>,
{
    let result = match tokio::time::timeout(limit, work).await {
        Ok(inner) => inner,
        Err(_) => Err(AppError::Timeout(limit.as_secs())),
    };
    cleanup.await;
    result
}

/// Locate a real Chrome/Chromium binary, honouring `CHROME_BIN`.
///
/// Returns `None` to let `chromiumoxide` do its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        // Snap wrapper strips headless flags; use the binary inside it.
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn flag() -> (Arc<AtomicBool>, impl Future<Output = ()>) {
        let closed = Arc::new(AtomicBool::new(false));
        let cleanup = {
            let closed = Arc::clone(&closed);
            async move { closed.store(true, Ordering::SeqCst) }
        };
        (closed, cleanup)
    }

    #[tokio::test]
    async fn cleanup_runs_after_success() {
        let (closed, cleanup) = flag();

        let html = bounded_then(Duration::from_secs(1), async { Ok("<html></html>") }, cleanup)
            .await
            .unwrap();

        assert_eq!(html, "<html></html>");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_runs_after_error() {
        let (closed, cleanup) = flag();

        let result: Result<String, AppError> = bounded_then(
            Duration::from_secs(1),
            async { Err(AppError::HttpError("Page did not render body".into())) },
            cleanup,
        )
        .await;

        assert!(matches!(result, Err(AppError::HttpError(_))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_runs_after_timeout() {
        let (closed, cleanup) = flag();

        let result: Result<String, AppError> = bounded_then(
            Duration::from_millis(20),
            std::future::pending(),
            cleanup,
        )
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn nothing_is_launched_until_connect() {
        let fetcher = BrowserFetcher::new().scan_full_page(Duration::from_millis(100));
        assert!(fetcher.browser.try_lock().unwrap().is_none());
        assert!(fetcher.scan_full_page);
    }
}
