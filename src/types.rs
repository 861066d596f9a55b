use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A normalized, interning-friendly ingredient identifier. Two
/// `CanonicalName`s compare equal iff their underlying strings match;
/// cheap to clone since the string payload is `Arc`-shared.
#[derive(Clone, Eq, Serialize, Deserialize)]
pub struct CanonicalName(Arc<str>);

impl CanonicalName {
    /// Wraps an already-canonicalized string. Callers outside `normalize`
    /// should not construct this directly; prefer `normalize::normalize`.
    pub fn new_unchecked(s: impl Into<Arc<str>>) -> Self {
        CanonicalName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for CanonicalName {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl std::hash::Hash for CanonicalName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalName({:?})", self.0)
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CanonicalName {
    fn from(s: &str) -> Self {
        CanonicalName(Arc::from(s))
    }
}

/// An unnormalized string as supplied by a caller or an OCR pipeline.
/// Exists only for the duration of one `normalize` call.
pub type RawName = String;

/// Registry identifiers. A tagged enum rather than a string or trait
/// object so the resilience layer and per-registry config table stay
/// exhaustively matchable.
///
/// Serializes/deserializes via plain strings (not the derive-generated
/// unit-variant encoding) so it can be used as a `HashMap` key under
/// formats, like TOML, whose map-key serialization requires `serialize_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryId {
    Fda,
    Ewg,
    Cir,
    Sccs,
    Iccr,
    PubChem,
    InciBeauty,
}

impl RegistryId {
    pub const ALL: [RegistryId; 7] = [
        RegistryId::Fda,
        RegistryId::Ewg,
        RegistryId::Cir,
        RegistryId::Sccs,
        RegistryId::Iccr,
        RegistryId::PubChem,
        RegistryId::InciBeauty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryId::Fda => "fda",
            RegistryId::Ewg => "ewg",
            RegistryId::Cir => "cir",
            RegistryId::Sccs => "sccs",
            RegistryId::Iccr => "iccr",
            RegistryId::PubChem => "pubchem",
            RegistryId::InciBeauty => "inci_beauty",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<RegistryId> {
        match s {
            "fda" => Some(RegistryId::Fda),
            "ewg" => Some(RegistryId::Ewg),
            "cir" => Some(RegistryId::Cir),
            "sccs" => Some(RegistryId::Sccs),
            "iccr" => Some(RegistryId::Iccr),
            "pubchem" => Some(RegistryId::PubChem),
            "inci_beauty" => Some(RegistryId::InciBeauty),
            _ => None,
        }
    }
}

impl Serialize for RegistryId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RegistryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RegistryId::from_str_opt(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown registry id {s:?}")))
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Moderate,
    High,
    Critical,
    Unknown,
}

impl RiskLevel {
    /// The context-term weight spec §4.6 step 2 assigns each level.
    pub fn weight(&self) -> f64 {
        match self {
            RiskLevel::Safe => 100.0,
            RiskLevel::Low => 90.0,
            RiskLevel::Moderate => 60.0,
            RiskLevel::High => 20.0,
            RiskLevel::Critical => 5.0,
            RiskLevel::Unknown => 50.0,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
            RiskLevel::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// One registry's raw opinion about one ingredient. Immutable once
/// produced by a Fetcher; stored as an L2 cache value keyed by
/// `(registry_id, canonical_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFragment {
    pub registry_id: RegistryId,
    pub fetched_at: i64,
    pub risk_level: Option<RiskLevel>,
    pub eco_score: Option<f64>,
    pub status: Option<String>,
    pub concerns: Vec<String>,
    pub raw_text: Option<String>,
    pub source_urls: Vec<String>,
}

/// The aggregated, multi-registry view of one ingredient. Owned by the
/// Local Catalog; other components hold read-only `Arc` handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyProfile {
    pub canonical_name: CanonicalName,
    pub risk_level: RiskLevel,
    pub safety_score: f64,
    pub eco_score: f64,
    pub per_registry_status: std::collections::HashMap<String, String>,
    pub concerns: Vec<String>,
    pub sources: Vec<RegistryId>,
    #[serde(default)]
    pub last_updated: i64,
    pub functional_categories: Vec<FunctionalCategory>,
}

impl SafetyProfile {
    pub fn placeholder(canonical_name: CanonicalName, now: i64) -> Self {
        SafetyProfile {
            canonical_name,
            risk_level: RiskLevel::Unknown,
            safety_score: 50.0,
            eco_score: 50.0,
            per_registry_status: std::collections::HashMap::new(),
            concerns: Vec::new(),
            sources: Vec::new(),
            last_updated: now,
            functional_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalCategory {
    Emollient,
    Humectant,
    Emulsifier,
    Preservative,
    Antioxidant,
    Surfactant,
    Fragrance,
    Colorant,
    Sunscreen,
    Solvent,
    Active,
    Other,
}

impl FunctionalCategory {
    /// Parses the `{:?}` spelling a Fetcher packs into `RegistryFragment::raw_text`
    /// (see `registries::inci_beauty`) back into a variant.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Emollient" => Some(FunctionalCategory::Emollient),
            "Humectant" => Some(FunctionalCategory::Humectant),
            "Emulsifier" => Some(FunctionalCategory::Emulsifier),
            "Preservative" => Some(FunctionalCategory::Preservative),
            "Antioxidant" => Some(FunctionalCategory::Antioxidant),
            "Surfactant" => Some(FunctionalCategory::Surfactant),
            "Fragrance" => Some(FunctionalCategory::Fragrance),
            "Colorant" => Some(FunctionalCategory::Colorant),
            "Sunscreen" => Some(FunctionalCategory::Sunscreen),
            "Solvent" => Some(FunctionalCategory::Solvent),
            "Active" => Some(FunctionalCategory::Active),
            "Other" => Some(FunctionalCategory::Other),
            _ => None,
        }
    }
}

/// A scored, ranked replacement suggestion for a problematic ingredient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionCandidate {
    pub candidate: CanonicalName,
    pub similarity_score: f64,
    pub safety_improvement: f64,
    pub functional_similarity: f64,
    pub eco_improvement: f64,
    pub risk_reduction: f64,
    pub confidence: f64,
    pub reason: String,
    pub sources: Vec<RegistryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientResult {
    pub raw: String,
    pub canonical: Option<CanonicalName>,
    pub profile: Option<SafetyProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub per_ingredient: Vec<IngredientResult>,
    pub aggregate_safety_score: f64,
    pub problematic: Vec<CanonicalName>,
    pub substitution_map: std::collections::HashMap<String, Vec<SubstitutionCandidate>>,
    pub generated_at: i64,
    pub partial: bool,
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub include_substitutes: bool,
    pub k: usize,
    pub deadline: Option<std::time::Instant>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions { include_substitutes: true, k: 5, deadline: None }
    }
}
