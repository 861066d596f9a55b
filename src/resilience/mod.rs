mod circuit_breaker;
mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::{CacheHierarchy, WritePolicy};
use crate::capabilities::RegistryFetcher;
use crate::config::EngineConfig;
use crate::error::IieError;
use crate::types::{RegistryFragment, RegistryId};

/// Ties one registry's Circuit Breaker, Retry Policy, and Request
/// Cache (a thin `CacheHierarchy` wrapper scoped to idempotent GETs)
/// together. The Profile Aggregator calls `ResilienceLayer::call` for
/// every fetch instead of invoking a `RegistryFetcher` directly.
pub struct ResilienceLayer {
    breakers: HashMap<RegistryId, CircuitBreaker>,
    retries: HashMap<RegistryId, RetryPolicy>,
    cache_ttls: HashMap<RegistryId, Duration>,
    timeouts: HashMap<RegistryId, Duration>,
    request_cache: Arc<CacheHierarchy>,
}

impl ResilienceLayer {
    pub fn new(config: &EngineConfig, request_cache: Arc<CacheHierarchy>) -> Self {
        let mut breakers = HashMap::new();
        let mut retries = HashMap::new();
        let mut cache_ttls = HashMap::new();
        let mut timeouts = HashMap::new();
        for id in RegistryId::ALL {
            let rc = config.registry(id);
            breakers.insert(id, CircuitBreaker::new(&rc));
            retries.insert(id, RetryPolicy::new(&rc));
            cache_ttls.insert(id, Duration::from_secs(rc.cache_ttl_secs));
            timeouts.insert(id, Duration::from_secs(rc.timeout_secs));
        }
        ResilienceLayer { breakers, retries, cache_ttls, timeouts, request_cache }
    }

    #[instrument(skip(self, fetcher), fields(registry = %registry, canonical_name))]
    pub async fn call(
        &self,
        registry: RegistryId,
        canonical_name: &str,
        fetcher: &dyn RegistryFetcher,
    ) -> Result<RegistryFragment, IieError> {
        let cache_key = format!("fragment:{registry}:{canonical_name}");
        if let Some(bytes) = self.request_cache.get(&cache_key).await {
            if let Ok(fragment) = serde_json::from_slice::<RegistryFragment>(&bytes) {
                debug!("request cache hit");
                return Ok(fragment);
            }
        }

        let breaker = self.breakers.get(&registry).expect("all registries configured");
        if !breaker.can_execute() {
            return Err(IieError::CircuitOpen { registry });
        }

        let retry_policy = self.retries.get(&registry).expect("all registries configured");
        let timeout = *self.timeouts.get(&registry).expect("all registries configured");
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(timeout, fetcher.fetch(canonical_name)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(crate::error::FetchOutcome::transient(format!("timed out after {timeout:?}"))),
            };
            match outcome {
                Ok(fragment) => {
                    breaker.record_success();
                    let ttl = *self.cache_ttls.get(&registry).expect("all registries configured");
                    if let Ok(bytes) = serde_json::to_vec(&fragment) {
                        self.request_cache.set(&cache_key, bytes, Some(ttl), WritePolicy::Through).await;
                    }
                    return Ok(fragment);
                }
                Err(crate::error::FetchOutcome::NotFound) => {
                    // The registry responded; it just has no record. That
                    // is not a service failure, so it does not trip the
                    // breaker.
                    breaker.record_success();
                    return Err(crate::error::FetchOutcome::NotFound.into_error(registry, canonical_name));
                }
                Err(crate::error::FetchOutcome::Transient { reason, retry_after }) => {
                    if attempt + 1 < retry_policy.max_attempts() {
                        let delay = match retry_after {
                            Some(honored) => honored.min(retry_policy.max_delay()),
                            None => {
                                let jitter_sample = pseudo_jitter(attempt);
                                retry_policy.delay_for(attempt, jitter_sample)
                            }
                        };
                        warn!(attempt, ?delay, retry_after = retry_after.is_some(), "registry fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    breaker.record_failure();
                    return Err(crate::error::FetchOutcome::Transient { reason, retry_after }
                        .into_error(registry, canonical_name));
                }
                Err(outcome @ crate::error::FetchOutcome::Permanent { .. }) => {
                    breaker.record_failure();
                    return Err(outcome.into_error(registry, canonical_name));
                }
            }
        }
    }

    pub fn circuit_states(&self) -> HashMap<RegistryId, CircuitState> {
        self.breakers.iter().map(|(id, b)| (*id, b.state())).collect()
    }
}

/// Deterministic stand-in for `rand::random()` (this crate does not
/// depend on `rand`): derives a value in `[0, 1)` from the attempt
/// index and the current instant's sub-millisecond jitter, which is
/// good enough for spreading retries without a new dependency.
fn pseudo_jitter(attempt: u32) -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (((nanos.wrapping_add(attempt * 7919)) % 1000) as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StubRegistryFetcher;
    use crate::error::FetchOutcome;
    use crate::types::RiskLevel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyFetcher {
        registry_id: RegistryId,
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl RegistryFetcher for FlakyFetcher {
        fn registry_id(&self) -> RegistryId {
            self.registry_id
        }

        async fn fetch(&self, _canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
            let prev = self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
            if prev.unwrap_or(0) > 0 {
                return Err(FetchOutcome::transient("simulated"));
            }
            Ok(RegistryFragment {
                registry_id: self.registry_id,
                fetched_at: 0,
                risk_level: Some(RiskLevel::Safe),
                eco_score: Some(90.0),
                status: Some("approved".into()),
                concerns: vec![],
                raw_text: None,
                source_urls: vec![],
            })
        }
    }

    fn cache() -> Arc<CacheHierarchy> {
        let cfg = EngineConfig::default();
        Arc::new(CacheHierarchy::new(&cfg, None))
    }

    #[tokio::test]
    async fn not_found_does_not_trip_breaker() {
        let cfg = EngineConfig::default();
        let layer = ResilienceLayer::new(&cfg, cache());
        let fetcher = StubRegistryFetcher::new(RegistryId::Fda, HashMap::new());

        for _ in 0..5 {
            let _ = layer.call(RegistryId::Fda, "nonexistent", &fetcher).await;
        }
        assert_eq!(layer.circuit_states()[&RegistryId::Fda], CircuitState::Closed);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let mut cfg = EngineConfig::default();
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_base_millis = 1;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max = 3;
        let layer = ResilienceLayer::new(&cfg, cache());
        let fetcher = FlakyFetcher { registry_id: RegistryId::Fda, remaining_failures: AtomicU32::new(2) };

        let result = layer.call(RegistryId::Fda, "water", &fetcher).await;
        assert!(result.is_ok());
        assert_eq!(layer.circuit_states()[&RegistryId::Fda], CircuitState::Closed);
    }

    struct RetryAfterFetcher {
        registry_id: RegistryId,
        retry_after: Duration,
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl RegistryFetcher for RetryAfterFetcher {
        fn registry_id(&self) -> RegistryId {
            self.registry_id
        }

        async fn fetch(&self, _canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
            let prev = self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
            if prev.unwrap_or(0) > 0 {
                return Err(FetchOutcome::Transient {
                    reason: "rate limited".into(),
                    retry_after: Some(self.retry_after),
                });
            }
            Ok(RegistryFragment {
                registry_id: self.registry_id,
                fetched_at: 0,
                risk_level: Some(RiskLevel::Safe),
                eco_score: Some(90.0),
                status: Some("approved".into()),
                concerns: vec![],
                raw_text: None,
                source_urls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn retry_after_hint_is_honored_over_backoff_schedule() {
        let mut cfg = EngineConfig::default();
        // A backoff schedule that would be instant if taken, so the test
        // can tell whether the observed delay came from it or from the
        // much larger Retry-After hint.
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_base_millis = 1;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max = 3;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max_delay_millis = 10_000;
        let layer = ResilienceLayer::new(&cfg, cache());
        let fetcher = RetryAfterFetcher {
            registry_id: RegistryId::Fda,
            retry_after: Duration::from_millis(80),
            remaining_failures: AtomicU32::new(1),
        };

        let started = std::time::Instant::now();
        let result = layer.call(RegistryId::Fda, "water", &fetcher).await;
        let elapsed = started.elapsed();

        assert!(result.is_ok());
        assert!(elapsed >= Duration::from_millis(80), "expected the Retry-After delay to be honored, waited {elapsed:?}");
    }

    #[tokio::test]
    async fn retry_after_hint_is_clamped_to_configured_max_delay() {
        let mut cfg = EngineConfig::default();
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max = 2;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max_delay_millis = 5;
        let policy = RetryPolicy::new(&cfg.registry(RegistryId::Fda));
        let hint = Duration::from_secs(600);
        assert_eq!(hint.min(policy.max_delay()), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn exhausted_retries_trip_breaker() {
        let mut cfg = EngineConfig::default();
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_base_millis = 1;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().retry_max = 2;
        cfg.per_registry.get_mut(&RegistryId::Fda).unwrap().failure_threshold = 1;
        let layer = ResilienceLayer::new(&cfg, cache());
        let fetcher = FlakyFetcher { registry_id: RegistryId::Fda, remaining_failures: AtomicU32::new(100) };

        let result = layer.call(RegistryId::Fda, "water", &fetcher).await;
        assert!(result.is_err());
        assert_eq!(layer.circuit_states()[&RegistryId::Fda], CircuitState::Open);
    }
}
