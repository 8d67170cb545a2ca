use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::PageFetcher;
use crate::error::FetchError;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// How many times to try a fetch and how long to wait in between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter: Duration::ZERO,
        }
    }

    /// Add up to `jitter` of random delay on top of each backoff step
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` attempts failed
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Delay before the attempt that follows failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, multiplier, max } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let scaled = base.as_secs_f64() * multiplier.powi(exponent);
                if scaled.is_finite() && scaled >= 0.0 && scaled < max.as_secs_f64() {
                    Duration::from_secs_f64(scaled)
                } else {
                    max
                }
            }
        };

        if self.jitter.is_zero() {
            base
        } else {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            base + Duration::from_millis(extra)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Backoff::Exponential {
                base: Duration::from_millis(1000),
                multiplier: 2.0,
                max: Duration::from_secs(30),
            },
        )
        .with_jitter(Duration::from_millis(250))
    }
}

/// Wraps a fetcher and retries transient failures according to a [`RetryPolicy`]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: PageFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: PageFetcher> PageFetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str, wait_budget: Duration) -> Result<String, FetchError> {
        let mut attempt = 1;

        loop {
            debug!("Fetch attempt {}/{} for {}", attempt, self.policy.max_attempts, url);

            match self.inner.fetch(url, wait_budget).await {
                Ok(html) => return Ok(html),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    let delay = self
                        .policy
                        .delay_for(attempt)
                        .max(err.retry_hint().unwrap_or_default());
                    warn!(
                        "Attempt {} for {} failed ({}), retrying in {}ms",
                        attempt,
                        url,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!("Giving up on {} after {} attempts: {}", url, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }

    fn engine(&self) -> &'static str {
        self.inner.engine()
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::StaticFetcher;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(1)))
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::new(
            5,
            Backoff::Exponential {
                base: Duration::from_millis(100),
                multiplier: 2.0,
                max: Duration::from_millis(500),
            },
        );

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(10)))
            .with_jitter(Duration::from_millis(5));

        for attempt in 1..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(15));
        }
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO)).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_up_to_max_attempts() {
        let url = "https://shop.test/collections/roses";
        let fetcher = StaticFetcher::new().with_sequence(
            url,
            vec![
                Err(FetchError::transient(url, "timed out")),
                Err(FetchError::transient(url, "HTTP 503")),
                Ok("<html></html>".to_string()),
            ],
        );

        let retrying = RetryingFetcher::new(fetcher, fast_policy(3));
        let html = retrying.fetch(url, Duration::ZERO).await.unwrap();

        assert_eq!(html, "<html></html>");
        assert_eq!(retrying.inner().calls(url).await, 3);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_attempts() {
        let url = "https://shop.test/products/the-margot";
        let fetcher = StaticFetcher::new().with_error(url, FetchError::transient(url, "HTTP 502"));

        let retrying = RetryingFetcher::new(fetcher, fast_policy(4));
        let err = retrying.fetch(url, Duration::ZERO).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(retrying.inner().calls(url).await, 4);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_attempted_once() {
        let url = "https://shop.test/products/gone";
        let fetcher = StaticFetcher::new().with_error(url, FetchError::from_status(url, 404).unwrap());

        let retrying = RetryingFetcher::new(fetcher, fast_policy(5));
        let err = retrying.fetch(url, Duration::ZERO).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(retrying.inner().calls(url).await, 1);
    }
}
