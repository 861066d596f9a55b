use std::collections::HashMap;
use std::sync::Arc;

use rust_embed::RustEmbed;
use tokio::sync::RwLock;

use crate::capabilities::DurableStore;
use crate::error::IieError;
use crate::types::SafetyProfile;

#[derive(RustEmbed)]
#[folder = "data/"]
#[include = "catalog_seed.json"]
struct EmbeddedData;

fn seed_profiles() -> Vec<SafetyProfile> {
    let raw = EmbeddedData::get("catalog_seed.json").expect("catalog_seed.json must be embedded");
    let mut profiles: Vec<SafetyProfile> =
        serde_json::from_slice(&raw.data).expect("catalog_seed.json must be valid JSON");
    let now = now_unix();
    for p in &mut profiles {
        if p.last_updated == 0 {
            p.last_updated = now;
        }
    }
    profiles
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Authoritative in-memory `CanonicalName -> SafetyProfile` map, seeded
/// from the bundled dataset and kept in sync with the Durable Store.
/// Single `RwLock`: writers are rare (only on aggregation/upsert),
/// readers never block each other.
pub struct LocalCatalog {
    profiles: RwLock<HashMap<String, Arc<SafetyProfile>>>,
    durable: Option<Arc<dyn DurableStore>>,
}

impl LocalCatalog {
    pub async fn new(durable: Option<Arc<dyn DurableStore>>) -> Self {
        let mut map = HashMap::new();
        for p in seed_profiles() {
            map.insert(p.canonical_name.as_str().to_string(), Arc::new(p));
        }
        let catalog = LocalCatalog { profiles: RwLock::new(map), durable };
        catalog.refresh_from_durable().await.ok();
        catalog
    }

    /// Loads all rows from the Durable Store, overlaying them onto the
    /// bundled seed (durable rows win on key collision, since they
    /// reflect more recent registry fetches).
    pub async fn refresh_from_durable(&self) -> Result<(), IieError> {
        let Some(durable) = &self.durable else { return Ok(()) };
        let rows = durable.load_all_profiles().await?;
        let mut guard = self.profiles.write().await;
        for row in rows {
            guard.insert(row.canonical_name.as_str().to_string(), Arc::new(row));
        }
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<SafetyProfile>> {
        if let Some(p) = self.profiles.read().await.get(name) {
            return Some(p.clone());
        }
        self.fuzzy_lookup(name).await
    }

    pub async fn upsert(&self, profile: SafetyProfile) -> Result<(), IieError> {
        let key = profile.canonical_name.as_str().to_string();
        if let Some(durable) = &self.durable {
            durable.upsert_profile(&profile).await?;
        }
        self.profiles.write().await.insert(key, Arc::new(profile));
        Ok(())
    }

    pub async fn all(&self) -> Vec<Arc<SafetyProfile>> {
        self.profiles.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Substring containment, then bounded-cost best-ratio string
    /// similarity (Jaro-Winkler-style) with a minimum ratio of 0.55.
    /// The fuzzy result is never cached under the queried name to avoid
    /// poisoning future exact lookups.
    async fn fuzzy_lookup(&self, name: &str) -> Option<Arc<SafetyProfile>> {
        let guard = self.profiles.read().await;
        if let Some((_, p)) = guard.iter().find(|(k, _)| k.contains(name) || name.contains(k.as_str())) {
            return Some(p.clone());
        }
        let mut best: Option<(f64, Arc<SafetyProfile>)> = None;
        for (key, profile) in guard.iter() {
            let ratio = jaro_winkler(name, key);
            if ratio >= 0.55 && best.as_ref().map(|(r, _)| ratio > *r).unwrap_or(true) {
                best = Some((ratio, profile.clone()));
            }
        }
        best.map(|(_, p)| p)
    }
}

/// Jaro-Winkler similarity in `[0, 1]`. Hand-rolled rather than pulling
/// in a string-distance crate for one call site.
fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro = jaro_similarity(a, b);
    if jaro < 0.7 {
        return jaro;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let prefix_len = a_chars
        .iter()
        .zip(b_chars.iter())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count() as f64;
    jaro + prefix_len * 0.1 * (1.0 - jaro)
}

fn jaro_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let match_distance = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matches = vec![false; a.len()];
    let mut b_matches = vec![false; b.len()];
    let mut matches = 0usize;

    for (i, ac) in a.iter().enumerate() {
        let lo = i.saturating_sub(match_distance);
        let hi = (i + match_distance + 1).min(b.len());
        for j in lo..hi {
            if b_matches[j] || b[j] != *ac {
                continue;
            }
            a_matches[i] = true;
            b_matches[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for (i, matched) in a_matches.iter().enumerate() {
        if !matched {
            continue;
        }
        while !b_matches[k] {
            k += 1;
        }
        if a[i] != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    (m / a.len() as f64 + m / b.len() as f64 + (m - (transpositions as f64 / 2.0)) / m) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_exact_lookup() {
        let catalog = LocalCatalog::new(None).await;
        let p = catalog.get("water").await.expect("water is seeded");
        assert_eq!(p.canonical_name.as_str(), "water");
    }

    #[tokio::test]
    async fn fuzzy_lookup_matches_substring() {
        let catalog = LocalCatalog::new(None).await;
        let p = catalog.get("sodium lauryl sulfate usp").await;
        assert!(p.is_some());
    }

    #[tokio::test]
    async fn upsert_persists_through_durable_store() {
        use crate::capabilities::InMemoryDurableStore;
        use crate::types::{CanonicalName, RiskLevel};

        let durable: Arc<dyn DurableStore> = Arc::new(InMemoryDurableStore::new());
        let catalog = LocalCatalog::new(Some(durable.clone())).await;
        let profile = SafetyProfile::placeholder(CanonicalName::new_unchecked("new ingredient"), 0);
        catalog.upsert(profile).await.unwrap();

        let rows = durable.load_all_profiles().await.unwrap();
        assert!(rows.iter().any(|p| p.canonical_name.as_str() == "new ingredient"
            && p.risk_level == RiskLevel::Unknown));
    }

    #[test]
    fn jaro_winkler_exact_match_is_one() {
        assert!((jaro_winkler("water", "water") - 1.0).abs() < 1e-9);
    }
}
