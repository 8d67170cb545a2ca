use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub mod browser;
pub mod http_client;
pub mod rate_limiter;
pub mod retry;

pub use browser::BrowserFetcher;
pub use http_client::HttpFetcher;
pub use retry::{Backoff, RetryPolicy, RetryingFetcher};

use crate::config::{AppConfig, FetchEngine};
use crate::error::{FetchError, SproutlyResult};

/// Loads a URL and returns its rendered HTML.
///
/// `wait_budget` is how long the fetcher may let the page settle after the
/// initial load before reading the document.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, wait_budget: Duration) -> Result<String, FetchError>;

    /// Short name used in logs
    fn engine(&self) -> &'static str {
        "custom"
    }

    /// Release engine resources at the end of a run
    async fn close(&self) {}
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    async fn fetch(&self, url: &str, wait_budget: Duration) -> Result<String, FetchError> {
        (**self).fetch(url, wait_budget).await
    }

    fn engine(&self) -> &'static str {
        (**self).engine()
    }

    async fn close(&self) {
        (**self).close().await
    }
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Box<T> {
    async fn fetch(&self, url: &str, wait_budget: Duration) -> Result<String, FetchError> {
        (**self).fetch(url, wait_budget).await
    }

    fn engine(&self) -> &'static str {
        (**self).engine()
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Build the configured fetcher wrapped in the configured retry policy
pub async fn build_fetcher(config: &AppConfig) -> SproutlyResult<Arc<dyn PageFetcher>> {
    let policy = config.retry.policy();

    let fetcher: Arc<dyn PageFetcher> = match config.scraping.engine {
        FetchEngine::Http => {
            let http = HttpFetcher::new(&config.scraping)?;
            Arc::new(RetryingFetcher::new(http, policy))
        }
        FetchEngine::Browser => {
            let browser = BrowserFetcher::new(&config.scraping).await?;
            Arc::new(RetryingFetcher::new(browser, policy))
        }
    };

    info!(
        "Using {} fetcher with up to {} attempts per page",
        fetcher.engine(),
        config.retry.max_retries.max(1)
    );

    Ok(fetcher)
}

/// In-memory fetcher serving canned responses.
///
/// Each URL holds a queue of responses; the last one repeats once the queue
/// is drained. Unknown URLs answer with a permanent 404.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    closed: AtomicBool,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.with_sequence(url, vec![Ok(html.into())])
    }

    pub fn with_error(self, url: impl Into<String>, error: FetchError) -> Self {
        self.with_sequence(url, vec![Err(error)])
    }

    pub fn with_sequence(mut self, url: impl Into<String>, responses: Vec<Result<String, FetchError>>) -> Self {
        self.responses
            .get_mut()
            .insert(url.into(), responses.into_iter().collect());
        self
    }

    /// Number of fetches made for `url`
    pub async fn calls(&self, url: &str) -> usize {
        self.calls.lock().await.get(url).copied().unwrap_or(0)
    }

    /// Total fetches across all URLs
    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _wait_budget: Duration) -> Result<String, FetchError> {
        *self.calls.lock().await.entry(url.to_string()).or_insert(0) += 1;

        let mut responses = self.responses.lock().await;
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::permanent(url, "no response queued"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::permanent(url, "no response queued"))),
            None => Err(FetchError::from_status(url, 404)
                .unwrap_or_else(|| FetchError::permanent(url, "not found"))),
        }
    }

    fn engine(&self) -> &'static str {
        "static"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_serves_pages_and_counts_calls() {
        let fetcher = StaticFetcher::new().with_page("https://shop.test/", "<p>home</p>");

        assert_eq!(fetcher.fetch("https://shop.test/", Duration::ZERO).await.unwrap(), "<p>home</p>");
        assert_eq!(fetcher.fetch("https://shop.test/", Duration::ZERO).await.unwrap(), "<p>home</p>");
        assert_eq!(fetcher.calls("https://shop.test/").await, 2);

        let missing = fetcher.fetch("https://shop.test/missing", Duration::ZERO).await.unwrap_err();
        assert!(!missing.is_transient());
        assert_eq!(fetcher.total_calls().await, 3);
    }

    #[tokio::test]
    async fn test_fetcher_through_trait_object() {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(StaticFetcher::new().with_page("https://shop.test/a", "a"));

        assert_eq!(fetcher.engine(), "static");
        assert_eq!(fetcher.fetch("https://shop.test/a", Duration::ZERO).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_close_reaches_wrapped_engine() {
        let engine = Arc::new(StaticFetcher::new());
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(RetryingFetcher::new(engine.clone(), RetryPolicy::new(2, Backoff::Fixed(Duration::ZERO))));

        assert!(!engine.is_closed());
        fetcher.close().await;
        assert!(engine.is_closed());
    }
}
