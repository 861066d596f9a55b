use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use rust_embed::RustEmbed;

use crate::types::FunctionalCategory;

#[derive(RustEmbed)]
#[folder = "data/"]
#[include = "measurement_tokens.json"]
#[include = "synonyms.json"]
#[include = "lexicon.json"]
#[include = "user_condition_filters.json"]
struct EmbeddedData;

fn load_json<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let raw = EmbeddedData::get(name).unwrap_or_else(|| panic!("{name} must be embedded"));
    serde_json::from_slice(&raw.data).unwrap_or_else(|e| panic!("{name} must be valid JSON: {e}"))
}

#[derive(Debug, serde::Deserialize)]
struct MeasurementTokens {
    units: Vec<String>,
    connectors: Vec<String>,
}

/// The static measurement-token set and connector set used by
/// normalization step 5 to recognize "all tokens are units/connectors"
/// residues that should normalize to `None`.
pub struct MeasurementTable {
    units: HashSet<String>,
    connectors: HashSet<String>,
}

impl MeasurementTable {
    pub fn global() -> &'static MeasurementTable {
        static TABLE: OnceLock<MeasurementTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            let raw: MeasurementTokens = load_json("measurement_tokens.json");
            MeasurementTable {
                units: raw.units.into_iter().collect(),
                connectors: raw.connectors.into_iter().collect(),
            }
        })
    }

    pub fn is_unit(&self, token: &str) -> bool {
        self.units.contains(token)
    }

    pub fn is_connector(&self, token: &str) -> bool {
        self.connectors.contains(token)
    }

    pub fn is_unit_or_connector(&self, token: &str) -> bool {
        self.is_unit(token) || self.is_connector(token)
    }

    /// True if `token` is purely numeric (`"500"`) or a number glued to
    /// a known unit suffix (`"500mg"`).
    pub fn is_numeric_or_unit_suffixed(&self, token: &str) -> bool {
        if token.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        let digits_end = token.find(|c: char| !c.is_ascii_digit()).unwrap_or(token.len());
        if digits_end == 0 {
            return false;
        }
        self.units.contains(&token[digits_end..])
    }
}

/// The canonical->canonical synonym map, e.g. `"dl alpha tocopherol"` ->
/// `"vitamin e"`.
pub struct SynonymTable {
    map: HashMap<String, String>,
}

impl SynonymTable {
    pub fn global() -> &'static SynonymTable {
        static TABLE: OnceLock<SynonymTable> = OnceLock::new();
        TABLE.get_or_init(|| SynonymTable { map: load_json("synonyms.json") })
    }

    pub fn resolve<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.map.get(canonical).map(String::as_str).unwrap_or(canonical)
    }
}

/// The functional-category lexicon (canonical name -> categories),
/// shared by the Local Catalog's fuzzy fallback and the Substitution
/// Engine's candidate-pool bucketing.
pub struct Lexicon {
    categories: HashMap<String, Vec<FunctionalCategory>>,
}

impl Lexicon {
    pub fn global() -> &'static Lexicon {
        static TABLE: OnceLock<Lexicon> = OnceLock::new();
        TABLE.get_or_init(|| Lexicon { categories: load_json("lexicon.json") })
    }

    pub fn categories_for(&self, canonical: &str) -> &[FunctionalCategory] {
        self.categories.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ConditionFilter {
    #[serde(default)]
    pub excluded_categories: Vec<FunctionalCategory>,
    #[serde(default)]
    pub excluded_concerns: Vec<String>,
}

pub struct ConditionTable {
    map: HashMap<String, ConditionFilter>,
}

impl ConditionTable {
    pub fn global() -> &'static ConditionTable {
        static TABLE: OnceLock<ConditionTable> = OnceLock::new();
        TABLE.get_or_init(|| ConditionTable { map: load_json("user_condition_filters.json") })
    }

    pub fn filter_for(&self, condition: &str) -> Option<&ConditionFilter> {
        self.map.get(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_units_recognized() {
        let t = MeasurementTable::global();
        assert!(t.is_unit("mg"));
        assert!(t.is_connector("per"));
        assert!(t.is_numeric_or_unit_suffixed("500"));
        assert!(t.is_numeric_or_unit_suffixed("500mg"));
        assert!(!t.is_numeric_or_unit_suffixed("hexanediol"));
    }

    #[test]
    fn synonym_resolves() {
        let t = SynonymTable::global();
        assert_eq!(t.resolve("aqua"), "water");
        assert_eq!(t.resolve("unknown thing"), "unknown thing");
    }

    #[test]
    fn lexicon_has_categories() {
        let l = Lexicon::global();
        assert!(l.categories_for("water").contains(&FunctionalCategory::Solvent));
    }
}
