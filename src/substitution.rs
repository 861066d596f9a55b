use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use minijinja::{context, Environment};
use sha2::{Digest, Sha256};

use crate::cache::{CacheHierarchy, WritePolicy};
use crate::catalog::LocalCatalog;
use crate::embedding::EmbeddingSpace;
use crate::normalize::{ConditionTable, Lexicon};
use crate::types::{CanonicalName, FunctionalCategory, RegistryId, RiskLevel, SafetyProfile, SubstitutionCandidate};

const RESULT_CACHE_TTL: Duration = Duration::from_secs(86_400);

/// `hash(user_conditions)` per spec §4.8 step 6: conditions are sorted
/// before hashing so `["pregnancy", "sensitive skin"]` and its reverse
/// share a cache entry.
fn conditions_digest(user_conditions: &[String]) -> String {
    let mut sorted: Vec<&str> = user_conditions.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    for condition in sorted {
        hasher.update(condition.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

const REASON_TEMPLATE: &str = "\
{%- set clauses = [] -%}\
{%- if functionally_similar %}{% set clauses = clauses + [\"functionally similar\"] %}{% endif -%}\
{%- if safety_gain > 0 %}{% set clauses = clauses + [\"safer (+\" ~ safety_gain ~ \" pts)\"] %}{% endif -%}\
{%- if lower_risk %}{% set clauses = clauses + [\"lower risk\"] %}{% endif -%}\
{%- if eco_gain > 0 %}{% set clauses = clauses + [\"more eco-friendly\"] %}{% endif -%}\
{%- if clauses %}{{ clauses | join(\", \") }}{% else %}recommended alternative{% endif -%}";

fn reason_env() -> &'static Environment<'static> {
    static ENV: std::sync::OnceLock<Environment<'static>> = std::sync::OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.add_template("reason", REASON_TEMPLATE).expect("reason template must parse");
        env
    })
}

/// Risk-transition lookup for `risk_reduction`, per spec §4.8 step 3.
fn risk_reduction(target: RiskLevel, candidate: RiskLevel) -> f64 {
    use RiskLevel::*;
    match (target, candidate) {
        (Critical, Safe) | (High, Safe) => 1.0,
        (High, Low) | (Critical, Low) => 1.0,
        (Critical, Moderate) => 0.7,
        (Moderate, Low) | (Moderate, Safe) => 0.7,
        (High, Moderate) => 0.7,
        _ => 0.0,
    }
}

fn render_reason(functionally_similar: bool, safety_improvement: f64, lower_risk: bool, eco_improvement: f64) -> String {
    let env = reason_env();
    let tmpl = env.get_template("reason").expect("reason template registered");
    tmpl.render(context! {
        functionally_similar,
        safety_gain => safety_improvement.round() as i64,
        lower_risk,
        eco_gain => eco_improvement.round() as i64,
    })
    .unwrap_or_else(|_| "recommended alternative".to_string())
}

/// Scores and ranks substitute candidates for one ingredient. Holds no
/// state of its own; reads through to the Local Catalog and Embedding
/// Space handed to it at construction.
pub struct SubstitutionEngine {
    catalog: Arc<LocalCatalog>,
    embedding: Arc<EmbeddingSpace>,
    pool_size: usize,
    cache: Arc<CacheHierarchy>,
}

impl SubstitutionEngine {
    pub fn new(catalog: Arc<LocalCatalog>, embedding: Arc<EmbeddingSpace>, pool_size: usize, cache: Arc<CacheHierarchy>) -> Self {
        SubstitutionEngine { catalog, embedding, pool_size, cache }
    }

    pub async fn find_substitutes(&self, target: &CanonicalName, user_conditions: &[String], k: usize) -> Vec<SubstitutionCandidate> {
        let cache_key = format!("substitutes:{}:{}", target.as_str(), conditions_digest(user_conditions));
        if let Some(bytes) = self.cache.get(&cache_key).await {
            if let Ok(cached) = serde_json::from_slice::<Vec<SubstitutionCandidate>>(&bytes) {
                return cached;
            }
        }

        let Some(target_profile) = self.catalog.get(target.as_str()).await else {
            return Vec::new();
        };

        let candidates = self.candidate_pool(target.as_str()).await;
        let lexicon = Lexicon::global();
        let target_categories = lexicon.categories_for(target.as_str());
        let snapshot = self.embedding.current().await;
        let (excluded_categories, excluded_concerns) = condition_exclusions(user_conditions);

        let mut scored: Vec<SubstitutionCandidate> = Vec::new();
        for candidate in &candidates {
            if candidate.canonical_name == target_profile.canonical_name {
                continue;
            }
            let candidate_categories = lexicon.categories_for(candidate.canonical_name.as_str());
            if candidate_categories.iter().any(|cat| excluded_categories.contains(cat))
                || candidate
                    .concerns
                    .iter()
                    .any(|concern| excluded_concerns.iter().any(|ec| concern.contains(ec.as_str())))
            {
                continue;
            }
            let same_category = target_categories.iter().any(|c| candidate_categories.contains(c));
            let embed_sim = snapshot.similarity(target.as_str(), candidate.canonical_name.as_str()).unwrap_or(0.0);
            let func_sim = if same_category { 1.0 } else { embed_sim };

            let safety_improvement = candidate.safety_score - target_profile.safety_score;
            let eco_improvement = candidate.eco_score - target_profile.eco_score;
            let reduction = risk_reduction(target_profile.risk_level, candidate.risk_level);

            if safety_improvement < 0.0 && reduction == 0.0 {
                continue;
            }

            let similarity_score =
                0.5 * func_sim + 0.35 * embed_sim + 0.15 * (safety_improvement / 50.0).clamp(0.0, 1.0);
            let confidence = 0.5 * similarity_score
                + 0.25 * (safety_improvement / 30.0).clamp(0.0, 1.0)
                + 0.15 * embed_sim
                + 0.10 * reduction;

            let reason = render_reason(same_category, safety_improvement, reduction > 0.0, eco_improvement);

            scored.push(SubstitutionCandidate {
                candidate: candidate.canonical_name.clone(),
                similarity_score,
                safety_improvement,
                functional_similarity: func_sim,
                eco_improvement,
                risk_reduction: reduction,
                confidence,
                reason,
                sources: candidate.sources.clone(),
            });
        }

        scored.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal))
        });
        scored.truncate(k);

        if let Ok(bytes) = serde_json::to_vec(&scored) {
            self.cache.set(&cache_key, bytes, Some(RESULT_CACHE_TTL), WritePolicy::Through).await;
        }
        scored
    }

    /// Union of the target's functional-category bucket and the top-*M*
    /// profiles by embedding proximity, per spec §4.8 step 2.
    async fn candidate_pool(&self, target: &str) -> Vec<Arc<SafetyProfile>> {
        let lexicon = Lexicon::global();
        let target_categories: std::collections::HashSet<FunctionalCategory> =
            lexicon.categories_for(target).iter().copied().collect();

        let all = self.catalog.all().await;
        let mut pool: HashMap<String, Arc<SafetyProfile>> = HashMap::new();

        if !target_categories.is_empty() {
            for profile in &all {
                let categories = lexicon.categories_for(profile.canonical_name.as_str());
                if categories.iter().any(|c| target_categories.contains(c)) {
                    pool.insert(profile.canonical_name.as_str().to_string(), profile.clone());
                }
            }
        }

        let snapshot = self.embedding.current().await;
        for (name, _) in snapshot.nearest(target, self.pool_size) {
            if let Some(profile) = all.iter().find(|p| p.canonical_name.as_str() == name) {
                pool.insert(name, profile.clone());
            }
        }

        pool.into_values().collect()
    }
}

/// Union of every registered condition's `excluded_categories` and
/// `excluded_concerns` across `user_conditions`, per spec §4.8's
/// table-driven candidate filter. Unknown conditions contribute nothing.
fn condition_exclusions(
    user_conditions: &[String],
) -> (std::collections::HashSet<FunctionalCategory>, std::collections::HashSet<String>) {
    let table = ConditionTable::global();
    let mut excluded_categories: std::collections::HashSet<FunctionalCategory> = std::collections::HashSet::new();
    let mut excluded_concerns: std::collections::HashSet<String> = std::collections::HashSet::new();
    for condition in user_conditions {
        if let Some(filter) = table.filter_for(condition) {
            excluded_categories.extend(filter.excluded_categories.iter().copied());
            excluded_concerns.extend(filter.excluded_concerns.iter().cloned());
        }
    }
    (excluded_categories, excluded_concerns)
}
