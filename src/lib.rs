//! Ingredient Intelligence Engine core library: normalization, a local
//! safety-profile catalog, a multi-tier cache, a resilient multi-registry
//! fetch layer, an embedding space for substitution ranking, and the
//! orchestrator that ties them into one `analyze` / `substitutes` /
//! `normalize` surface.

pub mod aggregator;
pub mod cache;
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod health;
pub mod normalize;
pub mod orchestrator;
pub mod registries;
pub mod resilience;
pub mod scheduler;
pub mod substitution;
pub mod types;

pub use capabilities::{DurableStore, InMemoryDurableStore, InMemoryKv, KVStore, RegistryFetcher};
pub use config::EngineConfig;
pub use error::IieError;
pub use health::{EngineStatus, HealthSnapshot};
pub use orchestrator::EngineHandle;
pub use types::{
    Analysis, AnalyzeOptions, CanonicalName, FunctionalCategory, IngredientResult, RegistryFragment, RegistryId,
    RiskLevel, SafetyProfile, SubstitutionCandidate,
};

/// The crate version and build metadata `build.rs` embeds, surfaced for
/// `iie-cli --version` and the health snapshot's diagnostics.
pub mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const GIT_SHA: &str = env!("IIE_BUILD_GIT_SHA");
    pub const BUILD_DATE: &str = env!("IIE_BUILD_DATE");
}
