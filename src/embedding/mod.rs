pub mod kmeans;
pub mod pca;
pub mod vectorizer;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::normalize::normalize;
use crate::types::{RegistryId, RiskLevel, SafetyProfile};
use vectorizer::TfIdfVectorizer;

/// One profile's position in the embedded space, plus its cluster id
/// when clustering ran (`None` below *N* = 4 or when uncategorized).
#[derive(Debug, Clone)]
struct EmbeddedPoint {
    vector: Vec<f64>,
    cluster: Option<usize>,
}

/// An immutable, fully-built embedding over one generation of the
/// catalog. Replacing the space means building a brand new snapshot off
/// the lock and swapping it in, so no reader ever observes a half-built
/// space.
pub struct EmbeddingSnapshot {
    points: HashMap<String, EmbeddedPoint>,
    profile_count: usize,
}

impl EmbeddingSnapshot {
    fn empty() -> Self {
        EmbeddingSnapshot { points: HashMap::new(), profile_count: 0 }
    }

    pub fn similarity(&self, a: &str, b: &str) -> Option<f64> {
        let va = &self.points.get(a)?.vector;
        let vb = &self.points.get(b)?.vector;
        Some((dot(va, vb) + 1.0) / 2.0)
    }

    pub fn cluster_of(&self, name: &str) -> Option<usize> {
        self.points.get(name).and_then(|p| p.cluster)
    }

    /// Names ranked by proximity to `name`, best first, excluding `name`
    /// itself. Falls back to a linear scan (there is no index structure
    /// here beyond the flat point map, so "fall back to linear scan"
    /// from spec is simply "this is always a linear scan").
    pub fn nearest(&self, name: &str, limit: usize) -> Vec<(String, f64)> {
        let Some(origin) = self.points.get(name) else { return Vec::new() };
        let mut scored: Vec<(String, f64)> = self
            .points
            .iter()
            .filter(|(k, _)| k.as_str() != name)
            .map(|(k, p)| (k.clone(), (dot(&origin.vector, &p.vector) + 1.0) / 2.0))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Concatenation of normalized name tokens, risk level, per-registry
/// statuses, concerns and source ids -- the text signature from spec
/// §4.7 step 1.
fn text_signature(profile: &SafetyProfile) -> String {
    let mut parts = vec![profile.canonical_name.as_str().to_string(), profile.risk_level.to_string()];
    let mut statuses: Vec<&String> = profile.per_registry_status.values().collect();
    statuses.sort();
    for s in statuses {
        if let Some(c) = normalize(s) {
            parts.push(c.as_str().to_string());
        }
    }
    for concern in &profile.concerns {
        if let Some(c) = normalize(concern) {
            parts.push(c.as_str().to_string());
        }
    }
    for source in &profile.sources {
        parts.push(source.as_str().to_string());
    }
    parts.join(" ")
}

fn numeric_features(profile: &SafetyProfile) -> [f64; 8] {
    let eco_norm = (profile.eco_score / 100.0).clamp(0.0, 1.0);
    let safety_norm = (profile.safety_score / 100.0).clamp(0.0, 1.0);
    let risk_value = match profile.risk_level {
        RiskLevel::Safe => 0.0,
        RiskLevel::Low => 0.2,
        RiskLevel::Moderate => 0.5,
        RiskLevel::High => 0.8,
        RiskLevel::Critical => 1.0,
        RiskLevel::Unknown => 0.5,
    };
    let ewg_penalty = (profile.concerns.len() as f64 / 5.0).clamp(0.0, 1.0);
    let has = |id: RegistryId| if profile.sources.contains(&id) { 1.0 } else { 0.0 };
    [eco_norm, safety_norm, risk_value, ewg_penalty, has(RegistryId::Fda), has(RegistryId::Cir), has(RegistryId::Sccs), has(RegistryId::Iccr)]
}

/// Reader/writer-lock-guarded embedding space. Rebuild is triggered by
/// the orchestrator or catalog once the tracked add-count or percent
/// change crosses the configured threshold; `build` itself is a pure
/// function of the profile set so callers can run it off-lock.
pub struct EmbeddingSpace {
    snapshot: RwLock<Arc<EmbeddingSnapshot>>,
    config: EngineConfig,
}

impl EmbeddingSpace {
    pub fn new(config: EngineConfig) -> Self {
        EmbeddingSpace { snapshot: RwLock::new(Arc::new(EmbeddingSnapshot::empty())), config }
    }

    pub async fn current(&self) -> Arc<EmbeddingSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Whether a rebuild should run, per the add-count/percent-change
    /// trigger in spec §4.7.
    pub async fn needs_rebuild(&self, new_profile_count: usize) -> bool {
        let snapshot = self.snapshot.read().await;
        let prior = snapshot.profile_count;
        if prior == 0 {
            return new_profile_count > 0;
        }
        let added = new_profile_count.saturating_sub(prior);
        let pct = added as f64 / prior as f64;
        added >= self.config.embedding_rebuild_trigger_adds || pct >= self.config.embedding_rebuild_trigger_pct
    }

    /// Builds a brand new snapshot off-lock and swaps it in under the
    /// write guard in one assignment, per spec §4.7 concurrency rules.
    pub async fn rebuild(&self, profiles: &[Arc<SafetyProfile>]) {
        let fresh = build_snapshot(profiles, &self.config);
        let mut guard = self.snapshot.write().await;
        *guard = Arc::new(fresh);
    }
}

fn build_snapshot(profiles: &[Arc<SafetyProfile>], config: &EngineConfig) -> EmbeddingSnapshot {
    let n = profiles.len();
    if n == 0 {
        return EmbeddingSnapshot::empty();
    }

    let signatures: Vec<String> = profiles.iter().map(|p| text_signature(p)).collect();
    let vectorizer = TfIdfVectorizer::fit(&signatures, config.embedding_vocab_max, config.embedding_ngram_max);

    let mut vectors: Vec<Vec<f64>> = profiles
        .iter()
        .zip(signatures.iter())
        .map(|(p, sig)| {
            let mut v = vectorizer.transform(sig, config.embedding_ngram_max);
            v.extend(numeric_features(p));
            v
        })
        .collect();

    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    const REDUCTION_THRESHOLD: usize = 64;
    if dim > REDUCTION_THRESHOLD && n > 1 {
        let target = dim.min(n).min(10);
        vectors = pca::reduce(&vectors, target);
    }

    for v in vectors.iter_mut() {
        l2_normalize(v);
    }

    let clusters: Vec<Option<usize>> = if n >= 4 {
        let k = (n / 4).clamp(2, n - 1);
        kmeans::kmeans(&vectors, k, 50).into_iter().map(Some).collect()
    } else {
        vec![None; n]
    };

    let mut points = HashMap::with_capacity(n);
    for ((profile, vector), cluster) in profiles.iter().zip(vectors.into_iter()).zip(clusters.into_iter()) {
        points.insert(profile.canonical_name.as_str().to_string(), EmbeddedPoint { vector, cluster });
    }

    EmbeddingSnapshot { points, profile_count: n }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanonicalName;

    fn profile(name: &str, risk: RiskLevel, eco: f64, safety: f64) -> Arc<SafetyProfile> {
        Arc::new(SafetyProfile {
            canonical_name: CanonicalName::new_unchecked(name),
            risk_level: risk,
            safety_score: safety,
            eco_score: eco,
            per_registry_status: HashMap::new(),
            concerns: vec![],
            sources: vec![RegistryId::Fda],
            last_updated: 0,
            functional_categories: vec![],
        })
    }

    #[tokio::test]
    async fn similarity_is_one_for_identical_profiles() {
        let profiles = vec![
            profile("glycerin", RiskLevel::Safe, 90.0, 95.0),
            profile("glycerol", RiskLevel::Safe, 90.0, 95.0),
        ];
        let space = EmbeddingSpace::new(EngineConfig::default());
        space.rebuild(&profiles).await;
        let snapshot = space.current().await;
        let sim = snapshot.similarity("glycerin", "glycerol").unwrap();
        assert!(sim > 0.9);
    }

    #[tokio::test]
    async fn dissimilar_profiles_score_lower() {
        let profiles = vec![
            profile("safe thing", RiskLevel::Safe, 95.0, 98.0),
            profile("banned thing", RiskLevel::Critical, 5.0, 5.0),
        ];
        let space = EmbeddingSpace::new(EngineConfig::default());
        space.rebuild(&profiles).await;
        let snapshot = space.current().await;
        let close = snapshot.similarity("safe thing", "safe thing");
        let far = snapshot.similarity("safe thing", "banned thing").unwrap();
        assert!(close.is_none() || far < close.unwrap());
    }

    #[tokio::test]
    async fn clustering_only_runs_at_four_or_more_profiles() {
        let two = vec![profile("a", RiskLevel::Safe, 90.0, 90.0), profile("b", RiskLevel::Safe, 90.0, 90.0)];
        let space = EmbeddingSpace::new(EngineConfig::default());
        space.rebuild(&two).await;
        let snapshot = space.current().await;
        assert!(snapshot.cluster_of("a").is_none());

        let four = vec![
            profile("a", RiskLevel::Safe, 90.0, 90.0),
            profile("b", RiskLevel::Safe, 88.0, 92.0),
            profile("c", RiskLevel::Critical, 5.0, 5.0),
            profile("d", RiskLevel::Critical, 8.0, 7.0),
        ];
        space.rebuild(&four).await;
        let snapshot = space.current().await;
        assert!(snapshot.cluster_of("a").is_some());
    }

    #[tokio::test]
    async fn needs_rebuild_triggers_on_add_count() {
        let space = EmbeddingSpace::new(EngineConfig::default());
        assert!(space.needs_rebuild(1).await);
        let initial = vec![profile("a", RiskLevel::Safe, 90.0, 90.0)];
        space.rebuild(&initial).await;
        assert!(!space.needs_rebuild(1).await);
        assert!(space.needs_rebuild(1 + space.config.embedding_rebuild_trigger_adds).await);
    }

    #[tokio::test]
    async fn nearest_excludes_self() {
        let profiles = vec![
            profile("a", RiskLevel::Safe, 90.0, 90.0),
            profile("b", RiskLevel::Safe, 88.0, 92.0),
            profile("c", RiskLevel::Critical, 5.0, 5.0),
        ];
        let space = EmbeddingSpace::new(EngineConfig::default());
        space.rebuild(&profiles).await;
        let snapshot = space.current().await;
        let nearest = snapshot.nearest("a", 10);
        assert!(nearest.iter().all(|(name, _)| name != "a"));
        assert_eq!(nearest.len(), 2);
    }
}
