use std::collections::HashMap;

use crate::normalize::normalize;
use crate::registries::now_unix;
use crate::types::{CanonicalName, FunctionalCategory, RegistryFragment, RegistryId, RiskLevel, SafetyProfile};

fn default_weights() -> HashMap<RegistryId, f64> {
    HashMap::from([
        (RegistryId::Fda, 0.20),
        (RegistryId::Ewg, 0.25),
        (RegistryId::Cir, 0.15),
        (RegistryId::Sccs, 0.15),
        (RegistryId::Iccr, 0.05),
        (RegistryId::PubChem, 0.10),
        (RegistryId::InciBeauty, 0.10),
    ])
}

/// Per-registry sub-score in `[0, 100]`, per spec §4.6 step 2.
fn registry_sub_score(fragment: &RegistryFragment) -> f64 {
    match fragment.registry_id {
        RegistryId::Fda => {
            if fragment.status.as_deref() == Some("approved") {
                100.0
            } else {
                50.0
            }
        }
        RegistryId::Ewg => (100.0 - (fragment.concerns.len() as f64 * 20.0).min(100.0)).max(0.0),
        RegistryId::Cir | RegistryId::Sccs | RegistryId::Iccr => {
            fragment.risk_level.unwrap_or(RiskLevel::Unknown).weight()
        }
        RegistryId::PubChem | RegistryId::InciBeauty => fragment.eco_score.unwrap_or(50.0),
    }
}

fn severity_rank(level: RiskLevel) -> u8 {
    match level {
        RiskLevel::Unknown => 0,
        RiskLevel::Safe => 1,
        RiskLevel::Low => 2,
        RiskLevel::Moderate => 3,
        RiskLevel::High => 4,
        RiskLevel::Critical => 5,
    }
}

/// Merges fragments from multiple registries into one `SafetyProfile`
/// and computes the weighted safety score. Total (conflicting
/// fragments never abort aggregation); a profile computed from zero
/// fragments is still a valid `unknown`-risk placeholder.
pub fn aggregate(canonical_name: CanonicalName, fragments: &[RegistryFragment]) -> SafetyProfile {
    if fragments.is_empty() {
        return SafetyProfile::placeholder(canonical_name, now_unix());
    }

    let weights = default_weights();
    let mut present: Vec<RegistryId> = fragments.iter().map(|f| f.registry_id).collect();
    present.sort_by_key(|r| r.as_str());
    present.dedup();
    let total_base_weight: f64 = present.iter().map(|r| weights[r]).sum();

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for fragment in fragments {
        let redistributed = weights[&fragment.registry_id] / total_base_weight;
        weighted_sum += redistributed * registry_sub_score(fragment);
        weight_sum += redistributed;
    }

    let eco_values: Vec<f64> = fragments.iter().filter_map(|f| f.eco_score).collect();
    let eco_avg = if eco_values.is_empty() {
        50.0
    } else {
        eco_values.iter().sum::<f64>() / eco_values.len() as f64
    };
    weighted_sum += 0.2 * eco_avg;
    weight_sum += 0.2;

    // The risk-level context term deliberately uses the worst risk
    // level reported by any individual fragment, not the profile's own
    // (not-yet-computed) risk_level -- using the final verdict here
    // would make the formula circular.
    let worst_fragment_risk =
        fragments.iter().filter_map(|f| f.risk_level).max_by_key(|r| severity_rank(*r)).unwrap_or(RiskLevel::Unknown);
    weighted_sum += worst_fragment_risk.weight() * 0.15;
    weight_sum += 0.15;

    let safety_score = (weighted_sum / weight_sum).clamp(0.0, 100.0);

    let risk_level = if fragments.iter().any(|f| f.risk_level == Some(RiskLevel::Critical)) {
        RiskLevel::Critical
    } else if fragments.iter().any(|f| f.risk_level == Some(RiskLevel::High)) && safety_score < 50.0 {
        RiskLevel::High
    } else if safety_score >= 85.0 {
        RiskLevel::Safe
    } else if safety_score >= 70.0 {
        RiskLevel::Low
    } else if safety_score >= 50.0 {
        RiskLevel::Moderate
    } else if safety_score >= 30.0 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    };

    let mut concerns: Vec<String> = Vec::new();
    for fragment in fragments {
        for concern in &fragment.concerns {
            let canonical_concern = normalize(concern).map(|c| c.as_str().to_string()).unwrap_or_else(|| concern.clone());
            if !concerns.contains(&canonical_concern) {
                concerns.push(canonical_concern);
            }
        }
    }

    let mut per_registry_status = std::collections::HashMap::new();
    for fragment in fragments {
        if let Some(status) = &fragment.status {
            per_registry_status.insert(fragment.registry_id.as_str().to_string(), status.clone());
        }
    }

    // INCI Beauty is the only registry that reports a function list; it
    // packs `FunctionalCategory` labels into `raw_text` (see
    // `registries::inci_beauty`) since `RegistryFragment` has no
    // dedicated field for them.
    let mut functional_categories: Vec<FunctionalCategory> = Vec::new();
    for fragment in fragments.iter().filter(|f| f.registry_id == RegistryId::InciBeauty) {
        let Some(raw) = &fragment.raw_text else { continue };
        for label in raw.split(',') {
            if let Some(category) = FunctionalCategory::from_label(label) {
                if !functional_categories.contains(&category) {
                    functional_categories.push(category);
                }
            }
        }
    }

    SafetyProfile {
        canonical_name,
        risk_level,
        safety_score,
        eco_score: eco_avg,
        per_registry_status,
        concerns,
        sources: present,
        last_updated: now_unix(),
        functional_categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(registry_id: RegistryId, risk: Option<RiskLevel>, eco: Option<f64>, status: Option<&str>, concerns: Vec<&str>) -> RegistryFragment {
        RegistryFragment {
            registry_id,
            fetched_at: 0,
            risk_level: risk,
            eco_score: eco,
            status: status.map(String::from),
            concerns: concerns.into_iter().map(String::from).collect(),
            raw_text: None,
            source_urls: vec![],
        }
    }

    #[test]
    fn empty_fragments_yield_unknown_placeholder() {
        let p = aggregate(CanonicalName::new_unchecked("x"), &[]);
        assert_eq!(p.risk_level, RiskLevel::Unknown);
        assert_eq!(p.eco_score, 50.0);
        assert!(p.sources.is_empty());
    }

    #[test]
    fn score_is_bounded_and_sources_recorded() {
        let fragments = vec![
            fragment(RegistryId::Fda, None, None, Some("approved"), vec![]),
            fragment(RegistryId::Ewg, None, None, None, vec!["irritation"]),
        ];
        let p = aggregate(CanonicalName::new_unchecked("test"), &fragments);
        assert!(p.safety_score >= 0.0 && p.safety_score <= 100.0);
        assert_eq!(p.sources.len(), 2);
        assert!(matches!(p.risk_level, RiskLevel::Safe | RiskLevel::Low | RiskLevel::Moderate));
    }

    #[test]
    fn critical_fragment_forces_critical_profile() {
        let fragments = vec![fragment(RegistryId::Sccs, Some(RiskLevel::Critical), None, Some("prohibited"), vec!["prohibited"])];
        let p = aggregate(CanonicalName::new_unchecked("banned thing"), &fragments);
        assert_eq!(p.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn concerns_are_deduplicated() {
        let fragments = vec![
            fragment(RegistryId::Ewg, Some(RiskLevel::High), None, None, vec!["Irritation"]),
            fragment(RegistryId::Cir, Some(RiskLevel::Moderate), None, None, vec!["irritation"]),
        ];
        let p = aggregate(CanonicalName::new_unchecked("x"), &fragments);
        assert_eq!(p.concerns.len(), 1);
    }

    #[test]
    fn inci_beauty_raw_text_populates_functional_categories() {
        let mut inci_fragment = fragment(RegistryId::InciBeauty, Some(RiskLevel::Safe), Some(90.0), None, vec![]);
        inci_fragment.raw_text = Some("Humectant,Emollient".to_string());
        let p = aggregate(CanonicalName::new_unchecked("glycerin"), &[inci_fragment]);
        assert_eq!(
            p.functional_categories,
            vec![crate::types::FunctionalCategory::Humectant, crate::types::FunctionalCategory::Emollient]
        );
    }

    #[test]
    fn other_registries_do_not_contribute_functional_categories() {
        let fragments = vec![fragment(RegistryId::Fda, None, None, Some("approved"), vec![])];
        let p = aggregate(CanonicalName::new_unchecked("x"), &fragments);
        assert!(p.functional_categories.is_empty());
    }
}
