use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RegistryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// Per-registry three-state circuit breaker (spec §4.4). State
/// transitions happen under a small `Mutex`; `can_execute`/
/// `record_success`/`record_failure` never hold the lock across an
/// await point, so contention is negligible relative to the network
/// call they guard.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: &RegistryConfig) -> Self {
        CircuitBreaker {
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            success_threshold: config.success_threshold,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns `true` if a call is allowed to proceed. If the breaker is
    /// `Open` but the recovery timeout has elapsed, transitions to
    /// `HalfOpen` and allows exactly this one probing call through.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("lock poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, recovery_timeout_secs: u64, success_threshold: u32) -> RegistryConfig {
        let mut c = RegistryConfig::default();
        c.failure_threshold = failure_threshold;
        c.recovery_timeout_secs = recovery_timeout_secs;
        c.success_threshold = success_threshold;
        c
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(&config(3, 30, 2));
        assert!(cb.can_execute());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new(&config(1, 0, 1));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        // recovery_timeout is 0, so the next check transitions immediately.
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(&config(1, 0, 1));
        cb.record_failure();
        cb.can_execute();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes_after_threshold() {
        let cb = CircuitBreaker::new(&config(1, 0, 2));
        cb.record_failure();
        cb.can_execute();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
