use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Spaces out requests to the same host
pub struct RateLimiter {
    next_slots: Mutex<HashMap<String, Instant>>,
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            next_slots: Mutex::new(HashMap::new()),
            delay,
        }
    }

    /// Wait until a request to `domain` is allowed
    pub async fn wait_for_domain(&self, domain: &str) {
        let now = Instant::now();
        let required_delay = {
            let mut slots = self.next_slots.lock().await;
            let next_slot = slots.entry(domain.to_string()).or_insert(now);

            // reserve a slot before releasing the lock so concurrent callers queue up
            let slot = (*next_slot).max(now);
            *next_slot = slot + self.delay;

            slot.saturating_duration_since(now)
        };

        if !required_delay.is_zero() {
            debug!("Rate limiting: waiting {}ms for domain {}", required_delay.as_millis(), domain);
            tokio::time::sleep(required_delay).await;
        }
    }
}
