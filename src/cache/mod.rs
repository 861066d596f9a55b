mod l1;

pub use l1::L1Cache;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::capabilities::KVStore;
use crate::config::EngineConfig;

/// How a `set` call propagates to the lower tiers. Read order is always
/// L1 -> L2 -> L3 with promotion on hit; this only governs writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Write to every enabled tier synchronously. Default.
    Through,
    /// Write to L2/L3 only, skip L1 (useful for bulk-seeding data the
    /// caller does not expect to re-read immediately).
    Around,
    /// Write to L1 immediately; propagate to L2 in the background.
    Back,
}

/// The three-tier cache described in spec §4.3: L1 (per-process LRU,
/// TTL seconds), L2 (shared KV, TTL minutes-hours), L3 (durable store,
/// TTL days). Read order is L1 -> L2 -> L3 -> origin, promoting a hit
/// at any lower tier back up into every tier above it. L3 speaks the
/// same byte-oriented `KVStore` contract as L2 (just pointed at a
/// longer-lived backend); the row-oriented `DurableStore` capability is
/// a separate concern owned by the Local Catalog for restart recovery.
pub struct CacheHierarchy {
    l1: Mutex<L1Cache>,
    l2: Option<Arc<dyn KVStore>>,
    l2_ttl: Duration,
    l2_healthy: std::sync::atomic::AtomicBool,
    l3: Option<Arc<dyn KVStore>>,
    l3_ttl: Duration,
    l3_healthy: std::sync::atomic::AtomicBool,
}

impl CacheHierarchy {
    pub fn new(config: &EngineConfig, l2: Option<Arc<dyn KVStore>>) -> Self {
        Self::with_l3(config, l2, None)
    }

    pub fn with_l3(config: &EngineConfig, l2: Option<Arc<dyn KVStore>>, l3: Option<Arc<dyn KVStore>>) -> Self {
        CacheHierarchy {
            l1: Mutex::new(L1Cache::new(
                config.l1_max_entries,
                Duration::from_secs(config.l1_ttl_secs),
            )),
            l2,
            l2_ttl: Duration::from_secs(config.l2_ttl_secs),
            l2_healthy: std::sync::atomic::AtomicBool::new(true),
            l3,
            l3_ttl: Duration::from_secs(config.l3_ttl_secs),
            l3_healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(v) = self.l1.lock().await.get(key) {
            return Some(v);
        }
        if let Some(l2) = &self.l2 {
            match l2.get(key).await {
                Ok(Some(v)) => {
                    self.mark_l2_healthy();
                    self.l1.lock().await.set(key.to_string(), v.clone(), None);
                    return Some(v);
                }
                Ok(None) => self.mark_l2_healthy(),
                Err(e) => self.mark_l2_unhealthy(&e.to_string()),
            }
        }
        let l3 = self.l3.as_ref()?;
        match l3.get(key).await {
            Ok(Some(v)) => {
                self.mark_l3_healthy();
                self.l1.lock().await.set(key.to_string(), v.clone(), None);
                self.write_l2(key, v.clone(), None).await;
                Some(v)
            }
            Ok(None) => {
                self.mark_l3_healthy();
                None
            }
            Err(e) => {
                self.mark_l3_unhealthy(&e.to_string());
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>, policy: WritePolicy) {
        match policy {
            WritePolicy::Through => {
                self.l1.lock().await.set(key.to_string(), value.clone(), ttl);
                self.write_l2(key, value.clone(), ttl).await;
                self.write_l3(key, value, ttl).await;
            }
            WritePolicy::Around => {
                self.write_l2(key, value.clone(), ttl).await;
                self.write_l3(key, value, ttl).await;
            }
            WritePolicy::Back => {
                self.l1.lock().await.set(key.to_string(), value.clone(), ttl);
                if let Some(l2) = self.l2.clone() {
                    let key_owned = key.to_string();
                    let value_owned = value.clone();
                    let ttl = ttl.unwrap_or(self.l2_ttl);
                    tokio::spawn(async move {
                        if let Err(e) = l2.set(&key_owned, value_owned, ttl).await {
                            warn!(error = %e, "background L2 write failed");
                        }
                    });
                }
                if let Some(l3) = self.l3.clone() {
                    let key = key.to_string();
                    let ttl = ttl.unwrap_or(self.l3_ttl);
                    tokio::spawn(async move {
                        if let Err(e) = l3.set(&key, value, ttl).await {
                            warn!(error = %e, "background L3 write failed");
                        }
                    });
                }
            }
        }
    }

    async fn write_l2(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        if let Some(l2) = &self.l2 {
            let ttl = ttl.unwrap_or(self.l2_ttl);
            if let Err(e) = l2.set(key, value, ttl).await {
                self.mark_l2_unhealthy(&e.to_string());
            } else {
                self.mark_l2_healthy();
            }
        }
    }

    async fn write_l3(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        if let Some(l3) = &self.l3 {
            let ttl = ttl.unwrap_or(self.l3_ttl);
            if let Err(e) = l3.set(key, value, ttl).await {
                self.mark_l3_unhealthy(&e.to_string());
            } else {
                self.mark_l3_healthy();
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        self.l1.lock().await.delete(key);
        if let Some(l2) = &self.l2 {
            let _ = l2.delete(key).await;
        }
        if let Some(l3) = &self.l3 {
            let _ = l3.delete(key).await;
        }
    }

    pub async fn delete_prefix(&self, prefix: &str) {
        self.l1.lock().await.delete_prefix(prefix);
    }

    pub async fn l1_len(&self) -> usize {
        self.l1.lock().await.len()
    }

    pub fn l2_available(&self) -> bool {
        self.l2.is_some() && self.l2_healthy.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn l3_available(&self) -> bool {
        self.l3.is_some() && self.l3_healthy.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn mark_l2_healthy(&self) {
        self.l2_healthy.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    fn mark_l2_unhealthy(&self, reason: &str) {
        let was_healthy = self.l2_healthy.swap(false, std::sync::atomic::Ordering::Relaxed);
        if was_healthy {
            warn!(reason, "L2 cache tier degraded, falling back to L1-only reads");
        }
    }

    fn mark_l3_healthy(&self) {
        self.l3_healthy.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    fn mark_l3_unhealthy(&self, reason: &str) {
        let was_healthy = self.l3_healthy.swap(false, std::sync::atomic::Ordering::Relaxed);
        if was_healthy {
            warn!(reason, "L3 cache tier degraded, falling back to L1/L2-only reads");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::InMemoryKv;

    #[tokio::test]
    async fn write_through_then_read_hits_l1() {
        let cfg = EngineConfig::default();
        let kv: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let cache = CacheHierarchy::new(&cfg, Some(kv));
        cache.set("k", b"v".to_vec(), None, WritePolicy::Through).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn write_around_skips_l1_but_reaches_l2() {
        let cfg = EngineConfig::default();
        let kv: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let cache = CacheHierarchy::new(&cfg, Some(kv));
        cache.set("k", b"v".to_vec(), None, WritePolicy::Around).await;
        assert_eq!(cache.l1_len().await, 0);
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn write_back_reaches_l2_eventually() {
        let cfg = EngineConfig::default();
        let kv = Arc::new(InMemoryKv::new());
        let cache = CacheHierarchy::new(&cfg, Some(kv.clone() as Arc<dyn KVStore>));
        cache.set("k", b"v".to_vec(), None, WritePolicy::Back).await;
        assert_eq!(cache.l1_len().await, 1);
        // The L2 write is spawned in the background; yield until it lands.
        for _ in 0..50 {
            if kv.get("k").await.unwrap().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(kv.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn missing_l2_degrades_silently() {
        let cfg = EngineConfig::default();
        let cache = CacheHierarchy::new(&cfg, None);
        cache.set("k", b"v".to_vec(), None, WritePolicy::Through).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
        assert!(!cache.l2_available());
    }

    #[tokio::test]
    async fn l2_miss_falls_through_to_l3_and_promotes() {
        let cfg = EngineConfig::default();
        let l2: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let l3: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        l3.set("k", b"from l3".to_vec(), Duration::from_secs(86_400)).await.unwrap();
        let cache = CacheHierarchy::with_l3(&cfg, Some(l2.clone()), Some(l3));

        assert_eq!(cache.get("k").await, Some(b"from l3".to_vec()));
        // Promoted into L1 and L2 on the way up.
        assert_eq!(cache.l1_len().await, 1);
        assert_eq!(l2.get("k").await.unwrap(), Some(b"from l3".to_vec()));
    }

    #[tokio::test]
    async fn write_through_reaches_all_three_tiers() {
        let cfg = EngineConfig::default();
        let l2: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let l3: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let cache = CacheHierarchy::with_l3(&cfg, Some(l2.clone()), Some(l3.clone()));

        cache.set("k", b"v".to_vec(), None, WritePolicy::Through).await;
        assert_eq!(l2.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(l3.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn missing_l3_reports_unavailable() {
        let cfg = EngineConfig::default();
        let cache = CacheHierarchy::with_l3(&cfg, None, None);
        assert!(!cache.l3_available());
    }

    #[tokio::test]
    async fn delete_removes_from_every_tier() {
        let cfg = EngineConfig::default();
        let l2: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let l3: Arc<dyn KVStore> = Arc::new(InMemoryKv::new());
        let cache = CacheHierarchy::with_l3(&cfg, Some(l2.clone()), Some(l3.clone()));
        cache.set("k", b"v".to_vec(), None, WritePolicy::Through).await;

        cache.delete("k").await;

        assert_eq!(cache.get("k").await, None);
        assert_eq!(l2.get("k").await.unwrap(), None);
        assert_eq!(l3.get("k").await.unwrap(), None);
    }
}
