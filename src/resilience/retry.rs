use std::time::Duration;

use crate::config::{RegistryConfig, RetryStrategy};

/// Computes the retry delay schedule described in spec §4.4. Pure
/// function of attempt index and config; jitter is sourced from an
/// injected RNG closure so the schedule is deterministically testable.
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    factor: f64,
    max_delay: Duration,
    strategy: RetryStrategy,
    jitter_enabled: bool,
}

impl RetryPolicy {
    pub fn new(config: &RegistryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.retry_max,
            base: Duration::from_millis(config.retry_base_millis),
            factor: config.retry_factor,
            max_delay: Duration::from_millis(config.retry_max_delay_millis),
            strategy: config.retry_strategy,
            jitter_enabled: config.jitter_enabled,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The configured ceiling every computed delay (including an
    /// honored `Retry-After`) is clamped to.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before attempt `attempt` (0-indexed, i.e. the delay taken
    /// *after* the `attempt`-th failure before retrying).
    pub fn delay_for(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let base_millis = self.base.as_millis() as f64;
        let mut delay = match self.strategy {
            RetryStrategy::Fixed => base_millis,
            RetryStrategy::Linear => base_millis * (attempt as f64 + 1.0),
            RetryStrategy::Exponential => base_millis * self.factor.powi(attempt as i32),
        };
        if self.jitter_enabled {
            delay += delay * 0.1 * jitter_sample.clamp(0.0, 1.0);
        }
        Duration::from_millis(delay.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Whether a given HTTP status code should be retried. Per spec:
    /// retry on transport errors (not modeled here, caller handles
    /// directly), 5xx, 408, and 429; never on other 4xx.
    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 408 || status == 429
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: RetryStrategy, jitter: bool) -> RegistryConfig {
        RegistryConfig {
            retry_max: 3,
            retry_base_millis: 1000,
            retry_factor: 2.0,
            retry_max_delay_millis: 10_000,
            retry_strategy: strategy,
            jitter_enabled: jitter,
            ..RegistryConfig::default()
        }
    }

    #[test]
    fn fixed_delay_is_constant() {
        let p = RetryPolicy::new(&config(RetryStrategy::Fixed, false));
        assert_eq!(p.delay_for(0, 0.0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3, 0.0), Duration::from_millis(1000));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let p = RetryPolicy::new(&config(RetryStrategy::Linear, false));
        assert_eq!(p.delay_for(0, 0.0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1, 0.0), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2, 0.0), Duration::from_millis(3000));
    }

    #[test]
    fn exponential_delay_doubles() {
        let p = RetryPolicy::new(&config(RetryStrategy::Exponential, false));
        assert_eq!(p.delay_for(0, 0.0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1, 0.0), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2, 0.0), Duration::from_millis(4000));
    }

    #[test]
    fn delay_clamped_to_max() {
        let p = RetryPolicy::new(&config(RetryStrategy::Exponential, false));
        assert_eq!(p.delay_for(10, 0.0), Duration::from_millis(10_000));
    }

    #[test]
    fn jitter_only_adds_up_to_ten_percent() {
        let p = RetryPolicy::new(&config(RetryStrategy::Fixed, true));
        let d = p.delay_for(0, 1.0);
        assert!(d >= Duration::from_millis(1000));
        assert!(d <= Duration::from_millis(1100));
    }

    #[test]
    fn status_retry_table() {
        assert!(RetryPolicy::is_retryable_status(500));
        assert!(RetryPolicy::is_retryable_status(503));
        assert!(RetryPolicy::is_retryable_status(408));
        assert!(RetryPolicy::is_retryable_status(429));
        assert!(!RetryPolicy::is_retryable_status(404));
        assert!(!RetryPolicy::is_retryable_status(400));
    }
}
