use async_trait::async_trait;
use reqwest::{header::{HeaderMap, HeaderValue}, Client};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::rate_limiter::RateLimiter;
use super::PageFetcher;
use crate::config::ScrapingConfig;
use crate::error::{FetchError, SproutlyError, SproutlyResult};

/// Plain HTTP page fetcher.
///
/// Returns the server-rendered HTML without running scripts, so lazily
/// loaded cards that need scrolling will be missing.
pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpFetcher {
    pub fn new(config: &ScrapingConfig) -> SproutlyResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(config.concurrency)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| SproutlyError::internal(format!("Failed to build HTTP client: {}", e)))?;

        info!("HTTP fetcher initialized ({}ms per-domain delay)", config.default_delay_ms);

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(Duration::from_millis(config.default_delay_ms)),
        })
    }

    async fn get(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.client.get(url.as_str()).send().await?;

        if let Some(err) = FetchError::from_status(url.as_str(), response.status().as_u16()) {
            return Err(err);
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _wait_budget: Duration) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::permanent(url, format!("invalid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::permanent(url, format!("unsupported scheme '{}'", parsed.scheme())));
        }

        self.rate_limiter
            .wait_for_domain(parsed.host_str().unwrap_or("unknown"))
            .await;

        let started = Instant::now();
        let result = self.get(&parsed).await;
        debug!(
            "HTTP GET {} -> {} in {}ms",
            url,
            if result.is_ok() { "ok" } else { "error" },
            started.elapsed().as_millis()
        );

        result
    }

    fn engine(&self) -> &'static str {
        "http"
    }
}
