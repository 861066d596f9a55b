use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchOutcome, IieError};
use crate::types::{RegistryFragment, RegistryId, SafetyProfile};

/// One named external registry's lookup capability. A host implements
/// this once per registry (or once generically, dispatching internally
/// on `RegistryId`) and hands `Arc<dyn RegistryFetcher>` instances to
/// the engine at startup.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    fn registry_id(&self) -> RegistryId;
    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome>;
}

/// Byte-oriented shared key-value store backing the L2 cache tier.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IieError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), IieError>;
    async fn delete(&self, key: &str) -> Result<(), IieError>;
}

/// Row-oriented durable persistence for `SafetyProfile`s, backing the
/// L3 cache tier and the Local Catalog's restart-recovery path.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_profile(&self, profile: &SafetyProfile) -> Result<(), IieError>;
    async fn load_all_profiles(&self) -> Result<Vec<SafetyProfile>, IieError>;
    async fn delete_profile(&self, canonical_name: &str) -> Result<(), IieError>;
}

/// In-memory `KVStore` used by this crate's own tests and by the demo
/// harness when no external cache is configured.
pub struct InMemoryKv {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        InMemoryKv { data: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KVStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IieError> {
        Ok(self.data.lock().expect("lock poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), IieError> {
        self.data.lock().expect("lock poisoned").insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), IieError> {
        self.data.lock().expect("lock poisoned").remove(key);
        Ok(())
    }
}

/// In-memory `DurableStore`, keyed by canonical name string.
pub struct InMemoryDurableStore {
    rows: Mutex<HashMap<String, SafetyProfile>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        InMemoryDurableStore { rows: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn upsert_profile(&self, profile: &SafetyProfile) -> Result<(), IieError> {
        self.rows
            .lock()
            .expect("lock poisoned")
            .insert(profile.canonical_name.as_str().to_string(), profile.clone());
        Ok(())
    }

    async fn load_all_profiles(&self) -> Result<Vec<SafetyProfile>, IieError> {
        Ok(self.rows.lock().expect("lock poisoned").values().cloned().collect())
    }

    async fn delete_profile(&self, canonical_name: &str) -> Result<(), IieError> {
        self.rows.lock().expect("lock poisoned").remove(canonical_name);
        Ok(())
    }
}

/// Table-driven stub `RegistryFetcher` used by integration tests: looks
/// up a canned `RegistryFragment` from a map, or reports `NotFound`.
pub struct StubRegistryFetcher {
    registry_id: RegistryId,
    fixtures: HashMap<String, RegistryFragment>,
}

impl StubRegistryFetcher {
    pub fn new(registry_id: RegistryId, fixtures: HashMap<String, RegistryFragment>) -> Self {
        StubRegistryFetcher { registry_id, fixtures }
    }
}

#[async_trait]
impl RegistryFetcher for StubRegistryFetcher {
    fn registry_id(&self) -> RegistryId {
        self.registry_id
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        self.fixtures.get(canonical_name).cloned().ok_or(FetchOutcome::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_kv_roundtrips() {
        let kv = InMemoryKv::new();
        kv.set("a", b"1".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some(b"1".to_vec()));
        kv.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stub_fetcher_reports_not_found_for_unknown_name() {
        let fetcher = StubRegistryFetcher::new(RegistryId::Fda, HashMap::new());
        let result = fetcher.fetch("water").await;
        assert_eq!(result.unwrap_err(), FetchOutcome::NotFound);
    }
}
