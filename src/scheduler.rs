//! The "capability-bounded scheduler" spec §4.5 requires wrapping
//! every parallel registry fan-out: a global outbound concurrency cap
//! plus a per-registry cap, with bounded queueing so callers fail fast
//! with `Overloaded` instead of piling up indefinitely (spec §5
//! Backpressure).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::EngineConfig;
use crate::error::IieError;
use crate::types::RegistryId;

/// How many callers may be waiting on `acquire` before it fails fast
/// with `Overloaded`, expressed as a multiple of the underlying
/// concurrency limit. Not itself a named config key (spec enumerates
/// the concurrency caps but leaves queue depth unspecified) -- chosen
/// generously enough that ordinary bursts never trip it.
const QUEUE_DEPTH_MULTIPLIER: usize = 4;

struct BoundedSemaphore {
    sem: Arc<Semaphore>,
    queued: AtomicUsize,
    max_queued: usize,
}

impl BoundedSemaphore {
    fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        BoundedSemaphore {
            sem: Arc::new(Semaphore::new(permits)),
            queued: AtomicUsize::new(0),
            max_queued: permits * QUEUE_DEPTH_MULTIPLIER,
        }
    }

    /// Counts every in-flight `acquire` call as "queued" for the
    /// duration of the wait, not just calls that actually block --
    /// an overcount relative to the literal queue depth, but cheap and
    /// conservative in the direction that matters (it only ever rejects
    /// calls too eagerly, never too late).
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, IieError> {
        let in_flight = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        if in_flight > self.max_queued {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(IieError::Overloaded);
        }
        let result = self.sem.clone().acquire_owned().await;
        self.queued.fetch_sub(1, Ordering::SeqCst);
        result.map_err(|_| IieError::Internal("scheduler semaphore closed".into()))
    }
}

/// Holds both permits for one scheduled call; releases them in reverse
/// acquisition order on drop.
pub struct SchedulerPermit {
    _registry: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Bounds fan-out across every registry fetch the engine issues:
/// a global cap (`global_outbound_concurrency`) and one cap per
/// registry (`RegistryConfig::concurrency`).
pub struct Scheduler {
    global: BoundedSemaphore,
    per_registry: HashMap<RegistryId, BoundedSemaphore>,
}

impl Scheduler {
    pub fn new(config: &EngineConfig) -> Self {
        let global = BoundedSemaphore::new(config.global_outbound_concurrency);
        let per_registry = RegistryId::ALL
            .into_iter()
            .map(|id| (id, BoundedSemaphore::new(config.registry(id).concurrency)))
            .collect();
        Scheduler { global, per_registry }
    }

    pub async fn acquire(&self, registry: RegistryId) -> Result<SchedulerPermit, IieError> {
        let global = self.global.acquire().await?;
        let registry_sem = self.per_registry.get(&registry).expect("all registries configured");
        let registry_permit = registry_sem.acquire().await?;
        Ok(SchedulerPermit { _registry: registry_permit, _global: global })
    }
}
