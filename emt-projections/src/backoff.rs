//! Exponential backoff for the consumer's outer poll loop.
//!
//! `StorageError` and `HandlerError` are logged and the loop continues rather
//! than crashing the consumer; an exponential backoff between retries of a
//! failing pass is recommended (not mandated) so a single bad event or a
//! transient outage doesn't busy-loop against the database.

use rand::Rng;
use std::time::Duration;

/// Exponential-backoff schedule with jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Start from the default schedule (100ms initial, 30s cap, 2x multiplier).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// The delay before retry attempt `attempt` (0-based), with up to 20%
    /// jitter applied to avoid synchronized retries across consumer instances.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_secs_f64(capped * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        let policy = BackoffPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        let first = policy.delay_for_attempt(0);
        let later = policy.delay_for_attempt(10);

        assert!(first <= Duration::from_millis(120));
        assert!(later <= Duration::from_millis(1100));
    }
}
