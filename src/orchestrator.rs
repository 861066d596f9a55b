//! The Analysis Orchestrator (spec §4.9): the public façade that drives
//! normalization -> profile lookup -> aggregation -> substitution and
//! owns every other process-wide singleton (spec §9 "Global state").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, instrument};

use crate::aggregator::aggregate;
use crate::cache::CacheHierarchy;
use crate::capabilities::{DurableStore, KVStore, RegistryFetcher};
use crate::catalog::LocalCatalog;
use crate::config::EngineConfig;
use crate::embedding::EmbeddingSpace;
use crate::health::{CacheSnapshot, HealthSnapshot};
use crate::registries::now_unix;
use crate::resilience::ResilienceLayer;
use crate::scheduler::Scheduler;
use crate::substitution::SubstitutionEngine;
use crate::types::{
    Analysis, AnalyzeOptions, CanonicalName, IngredientResult, RegistryFragment, RegistryId, RiskLevel,
    SafetyProfile, SubstitutionCandidate,
};

/// The long-lived, process-wide engine instance. Holds the Local
/// Catalog, Cache Hierarchy, Resilience tables, Embedding Space, and
/// Substitution Engine -- every singleton spec §9 calls out -- and is
/// the only thing a host needs to construct to get `analyze`,
/// `substitutes`, and `normalize`.
pub struct EngineHandle {
    config: EngineConfig,
    catalog: Arc<LocalCatalog>,
    cache: Arc<CacheHierarchy>,
    resilience: Arc<ResilienceLayer>,
    embedding: Arc<EmbeddingSpace>,
    substitution: Arc<SubstitutionEngine>,
    scheduler: Arc<Scheduler>,
    fetchers: HashMap<RegistryId, Arc<dyn RegistryFetcher>>,
}

impl EngineHandle {
    pub async fn new(
        config: EngineConfig,
        kv: Option<Arc<dyn KVStore>>,
        durable: Option<Arc<dyn DurableStore>>,
        fetchers: HashMap<RegistryId, Arc<dyn RegistryFetcher>>,
    ) -> Self {
        Self::with_l3(config, kv, None, durable, fetchers).await
    }

    /// Like `new`, but also wires a durable, day-scale-TTL `KVStore` as
    /// the Cache Hierarchy's L3 tier (spec §4.3). `l3` is independent of
    /// `durable`: the latter backs the Local Catalog's row-oriented
    /// restart recovery, the former backs the byte-oriented cache.
    pub async fn with_l3(
        config: EngineConfig,
        kv: Option<Arc<dyn KVStore>>,
        l3: Option<Arc<dyn KVStore>>,
        durable: Option<Arc<dyn DurableStore>>,
        fetchers: HashMap<RegistryId, Arc<dyn RegistryFetcher>>,
    ) -> Self {
        let catalog = Arc::new(LocalCatalog::new(durable).await);
        let cache = Arc::new(CacheHierarchy::with_l3(&config, kv, l3));
        let resilience = Arc::new(ResilienceLayer::new(&config, cache.clone()));
        let embedding = Arc::new(EmbeddingSpace::new(config.clone()));
        let scheduler = Arc::new(Scheduler::new(&config));

        // Seed the embedding space from whatever the catalog already
        // holds (the bundled dataset, plus anything restored from the
        // Durable Store) so the very first substitution query has a
        // populated snapshot instead of an empty one.
        let seed = catalog.all().await;
        embedding.rebuild(&seed).await;

        let substitution = Arc::new(SubstitutionEngine::new(
            catalog.clone(),
            embedding.clone(),
            config.substitute_candidate_pool_size,
            cache.clone(),
        ));

        info!(profiles = seed.len(), registries = fetchers.len(), "engine handle initialized");

        EngineHandle { config, catalog, cache, resilience, embedding, substitution, scheduler, fetchers }
    }

    /// §4.1 passthrough. Pure and synchronous; does not touch any
    /// shared state.
    pub fn normalize(&self, raw: &str) -> Option<CanonicalName> {
        crate::normalize::normalize(raw)
    }

    /// Looks a profile up by raw name, fetching it live on a cache miss.
    /// Backs a host's `GET /profile/{name}` adapter.
    pub async fn profile(&self, raw: &str) -> Option<Arc<SafetyProfile>> {
        let canonical = self.normalize(raw)?;
        Some(self.ensure_profile(&canonical).await)
    }

    /// §4.8 passthrough: resolves the target's profile (fetching on
    /// miss) and ranks substitute candidates for it.
    #[instrument(skip(self, user_conditions), fields(ingredient))]
    pub async fn substitutes(&self, ingredient: &str, user_conditions: &[String], k: usize) -> Vec<SubstitutionCandidate> {
        let Some(canonical) = self.normalize(ingredient) else { return Vec::new() };
        self.ensure_profile(&canonical).await;
        self.substitution.find_substitutes(&canonical, user_conditions, k).await
    }

    /// §4.9: the full ingredient-list analysis pipeline.
    #[instrument(skip(self, raws, user_conditions, opts), fields(count = raws.len()))]
    pub async fn analyze(&self, raws: &[String], user_conditions: &[String], opts: AnalyzeOptions) -> Analysis {
        let mut order: Vec<CanonicalName> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut per_raw: Vec<(String, Option<CanonicalName>)> = Vec::with_capacity(raws.len());

        for raw in raws {
            let canonical = self.normalize(raw);
            if let Some(c) = &canonical {
                if seen.insert(c.as_str().to_string()) {
                    order.push(c.clone());
                }
            }
            per_raw.push((raw.clone(), canonical));
        }

        let (profiles, partial) = self.collect_profiles(&order, opts.deadline).await;

        let mut per_ingredient = Vec::with_capacity(per_raw.len());
        let mut scores = Vec::new();
        for (raw, canonical) in per_raw {
            let profile = canonical.as_ref().and_then(|c| profiles.get(c.as_str()).cloned());
            if let Some(p) = &profile {
                scores.push(p.safety_score);
            }
            per_ingredient.push(IngredientResult { raw, canonical, profile: profile.map(|p| (*p).clone()) });
        }

        let aggregate_safety_score =
            if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };

        let problematic: Vec<CanonicalName> = order
            .iter()
            .filter(|name| {
                profiles
                    .get(name.as_str())
                    .map(|p| p.safety_score < 70.0 || matches!(p.risk_level, RiskLevel::High | RiskLevel::Critical))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut substitution_map = HashMap::new();
        if opts.include_substitutes {
            for name in &problematic {
                let candidates = self.substitution.find_substitutes(name, user_conditions, opts.k).await;
                substitution_map.insert(name.as_str().to_string(), candidates);
            }
        }

        Analysis {
            per_ingredient,
            aggregate_safety_score,
            problematic,
            substitution_map,
            generated_at: now_unix(),
            partial,
        }
    }

    /// Reads the live Circuit Breaker table and Cache Hierarchy tier
    /// availability to produce the `{status, circuits, cache}` triple
    /// spec §6's `GET /health` describes.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let circuits = self.resilience.circuit_states();
        let cache = CacheSnapshot {
            l1_size: self.cache.l1_len().await,
            l2_available: self.cache.l2_available(),
            l3_available: self.cache.l3_available(),
        };
        HealthSnapshot::new(circuits, cache)
    }

    pub async fn catalog_size(&self) -> usize {
        self.catalog.len().await
    }

    /// Resolves one canonical name's profile, fetching and aggregating
    /// it from the registries on a cache miss and writing the result
    /// back to the Local Catalog (which itself propagates to the
    /// Durable Store, per §4.2).
    async fn ensure_profile(&self, canonical: &CanonicalName) -> Arc<SafetyProfile> {
        if let Some(p) = self.catalog.get(canonical.as_str()).await {
            return p;
        }
        let fragments = self.fetch_fragments(canonical.as_str()).await;
        let profile = aggregate(canonical.clone(), &fragments);
        let _ = self.catalog.upsert(profile).await;
        self.maybe_rebuild_embedding().await;
        // The catalog stores what we just wrote; re-reading guarantees
        // every caller observes the same `Arc` the catalog itself holds.
        self.catalog
            .get(canonical.as_str())
            .await
            .unwrap_or_else(|| Arc::new(SafetyProfile::placeholder(canonical.clone(), now_unix())))
    }

    /// Calls every configured registry fetcher through the Resilience
    /// Layer in parallel, bounded by the Scheduler's global and
    /// per-registry caps (§4.5). A fetcher that errors (not-found,
    /// exhausted retries, open circuit, overloaded) simply contributes
    /// no fragment; it never aborts the others.
    async fn fetch_fragments(&self, canonical_name: &str) -> Vec<RegistryFragment> {
        let tasks = self.fetchers.iter().map(|(id, fetcher)| {
            let id = *id;
            let fetcher = fetcher.clone();
            let resilience = self.resilience.clone();
            let scheduler = self.scheduler.clone();
            let canonical_name = canonical_name.to_string();
            async move {
                let _permit = scheduler.acquire(id).await.ok()?;
                resilience.call(id, &canonical_name, fetcher.as_ref()).await.ok()
            }
        });
        futures::future::join_all(tasks).await.into_iter().flatten().collect()
    }

    async fn maybe_rebuild_embedding(&self) {
        let all = self.catalog.all().await;
        if self.embedding.needs_rebuild(all.len()).await {
            self.embedding.rebuild(&all).await;
        }
    }

    /// Resolves every canonical name's profile with per-analysis
    /// fan-out bounded by `per_analysis_fanout`, racing the batch
    /// against `deadline` if one was supplied. On expiry the profiles
    /// resolved so far are kept and `partial` is set -- per §5,
    /// cancellation means simply not waiting on the rest, not tearing
    /// anything down.
    async fn collect_profiles(
        &self,
        names: &[CanonicalName],
        deadline: Option<std::time::Instant>,
    ) -> (HashMap<String, Arc<SafetyProfile>>, bool) {
        let fanout = self.config.per_analysis_fanout.max(1);
        let mut results = HashMap::with_capacity(names.len());

        let mut stream = stream::iter(names.iter().cloned())
            .map(move |name| async move {
                let profile = self.ensure_profile(&name).await;
                (name, profile)
            })
            .buffer_unordered(fanout);

        let mut partial = false;
        loop {
            let next = match deadline {
                Some(deadline) => {
                    let tokio_deadline = tokio::time::Instant::from_std(deadline);
                    // `biased` so an already-elapsed deadline always wins the
                    // race instead of depending on tokio's randomized branch
                    // order -- both branches can be simultaneously ready when
                    // profile resolution completes without a real suspension
                    // point (e.g. in-memory stores, stub fetchers in tests).
                    tokio::select! {
                        biased;
                        _ = tokio::time::sleep_until(tokio_deadline) => {
                            partial = true;
                            None
                        }
                        item = stream.next() => item,
                    }
                }
                None => stream.next().await,
            };

            match next {
                Some((name, profile)) => {
                    results.insert(name.as_str().to_string(), profile);
                }
                None => break,
            }
            if partial {
                break;
            }
        }

        (results, partial)
    }
}
