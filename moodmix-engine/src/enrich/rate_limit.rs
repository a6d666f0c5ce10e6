//! Minimum spacing between outbound requests of one client

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
    label: &'static str,
}

impl RateLimiter {
    pub(crate) fn new(label: &'static str, min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
            label,
        }
    }

    /// Sleep until `min_interval` has passed since the previous request
    pub(crate) async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!(client = self.label, wait = ?wait_time, "Rate limiting");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new("test", Duration::from_millis(100));

        let start = Instant::now();
        limiter.wait().await;
        let first_elapsed = start.elapsed();

        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed.as_millis() < 50);
        assert!(second_elapsed.as_millis() >= 100);
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new("test", Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert!(start.elapsed().as_millis() < 50);
    }
}
