use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IieError;
use crate::types::RegistryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
    pub retry_max: u32,
    pub retry_base_millis: u64,
    pub retry_factor: f64,
    pub retry_max_delay_millis: u64,
    pub retry_strategy: RetryStrategy,
    pub jitter_enabled: bool,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 45,
            success_threshold: 2,
            retry_max: 2,
            retry_base_millis: 1500,
            retry_factor: 2.0,
            retry_max_delay_millis: 60_000,
            retry_strategy: RetryStrategy::Linear,
            jitter_enabled: true,
            cache_ttl_secs: 1800,
            timeout_secs: 30,
            concurrency: 3,
        }
    }
}

fn registry_defaults() -> HashMap<RegistryId, RegistryConfig> {
    let mut m = HashMap::new();
    m.insert(
        RegistryId::Fda,
        RegistryConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 30,
            success_threshold: 2,
            retry_max: 3,
            retry_base_millis: 1000,
            retry_factor: 2.0,
            retry_max_delay_millis: 60_000,
            retry_strategy: RetryStrategy::Exponential,
            jitter_enabled: true,
            cache_ttl_secs: 3600,
            timeout_secs: 30,
            concurrency: 3,
        },
    );
    m.insert(
        RegistryId::PubChem,
        RegistryConfig {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 2,
            retry_max: 3,
            retry_base_millis: 2000,
            retry_factor: 2.0,
            retry_max_delay_millis: 60_000,
            retry_strategy: RetryStrategy::Exponential,
            jitter_enabled: true,
            cache_ttl_secs: 7200,
            timeout_secs: 45,
            concurrency: 3,
        },
    );
    m.insert(
        RegistryId::Ewg,
        RegistryConfig {
            failure_threshold: 3,
            recovery_timeout_secs: 45,
            success_threshold: 2,
            retry_max: 2,
            retry_base_millis: 1500,
            retry_factor: 2.0,
            retry_max_delay_millis: 60_000,
            retry_strategy: RetryStrategy::Linear,
            jitter_enabled: true,
            cache_ttl_secs: 1800,
            timeout_secs: 20,
            concurrency: 3,
        },
    );
    for reg in [RegistryId::Cir, RegistryId::Sccs, RegistryId::Iccr, RegistryId::InciBeauty] {
        m.insert(reg, RegistryConfig::default());
    }
    m
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub l1_max_entries: usize,
    pub l1_ttl_secs: u64,
    pub l2_ttl_secs: u64,
    pub l3_ttl_secs: u64,
    pub default_ttl_secs: u64,
    pub global_outbound_concurrency: usize,
    pub per_analysis_fanout: usize,
    pub embedding_vocab_max: usize,
    pub embedding_ngram_max: usize,
    pub embedding_rebuild_trigger_adds: usize,
    pub embedding_rebuild_trigger_pct: f64,
    pub substitute_candidate_pool_size: usize,
    pub per_registry: HashMap<RegistryId, RegistryConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            l1_max_entries: 1000,
            l1_ttl_secs: 300,
            l2_ttl_secs: 3600,
            l3_ttl_secs: 86_400,
            default_ttl_secs: 1800,
            global_outbound_concurrency: 32,
            per_analysis_fanout: 16,
            embedding_vocab_max: 4096,
            embedding_ngram_max: 3,
            embedding_rebuild_trigger_adds: 50,
            embedding_rebuild_trigger_pct: 0.1,
            substitute_candidate_pool_size: 200,
            per_registry: registry_defaults(),
        }
    }
}

impl EngineConfig {
    /// Loads a TOML override file layered on top of the built-in
    /// defaults; missing keys keep their default value. A handful of
    /// global values can additionally be overridden through `IIE_*`
    /// environment variables, primarily useful in tests.
    pub fn load(path: Option<&Path>) -> Result<Self, IieError> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| IieError::Internal(format!("reading config {p:?}: {e}")))?;
                toml::from_str(&text)
                    .map_err(|e| IieError::Internal(format!("parsing config {p:?}: {e}")))?
            }
            _ => EngineConfig::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("IIE_GLOBAL_OUTBOUND_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.global_outbound_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("IIE_PER_ANALYSIS_FANOUT") {
            if let Ok(n) = v.parse() {
                self.per_analysis_fanout = n;
            }
        }
        if let Ok(v) = std::env::var("IIE_L1_MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                self.l1_max_entries = n;
            }
        }
    }

    pub fn registry(&self, id: RegistryId) -> RegistryConfig {
        self.per_registry.get(&id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        let fda = cfg.registry(RegistryId::Fda);
        assert_eq!(fda.failure_threshold, 3);
        assert_eq!(fda.recovery_timeout_secs, 30);
        let pubchem = cfg.registry(RegistryId::PubChem);
        assert_eq!(pubchem.failure_threshold, 5);
        assert_eq!(pubchem.cache_ttl_secs, 7200);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.l1_max_entries, 1000);
    }
}
