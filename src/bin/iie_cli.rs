//! Demo harness for the Ingredient Intelligence Engine: a thin clap CLI
//! wired against the real registry fetchers and an in-memory cache/store
//! pair, so the library surface can be exercised end to end without a
//! host application.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use iie_core::capabilities::{InMemoryDurableStore, InMemoryKv, RegistryFetcher};
use iie_core::registries::{cir, ewg, fda, iccr, inci_beauty, pubchem, sccs};
use iie_core::types::{AnalyzeOptions, RegistryId};
use iie_core::EngineHandle;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "iie-cli",
    about = "Look up, analyze, and find substitutes for cosmetic ingredients",
    version = iie_core::build_info::VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON instead of Markdown
    #[arg(short, long, global = true)]
    json: bool,

    /// Path to a TOML config file overriding the built-in defaults.
    /// Defaults to `$XDG_CONFIG_HOME/iie/config.toml` when that file exists.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,
}

fn default_config_path() -> Option<std::path::PathBuf> {
    let candidate = dirs::config_dir()?.join("iie").join("config.toml");
    candidate.exists().then_some(candidate)
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a comma-separated ingredient list
    Analyze {
        /// Ingredient names, e.g. "Aqua, Sodium Lauryl Sulfate, Parfum"
        #[arg(value_delimiter = ',')]
        ingredients: Vec<String>,
        /// Skin/health conditions to filter substitute suggestions by
        #[arg(long, value_delimiter = ',')]
        condition: Vec<String>,
        /// Don't compute substitute suggestions for problematic ingredients
        #[arg(long)]
        no_substitutes: bool,
        /// Abort the analysis (returning partial results) after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
    /// Rank substitute candidates for a single ingredient
    Substitutes {
        ingredient: String,
        #[arg(long, value_delimiter = ',')]
        condition: Vec<String>,
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Look up one ingredient's aggregated safety profile
    Profile { ingredient: String },
    /// Print circuit breaker and cache tier status
    Health,
}

fn real_fetchers() -> HashMap<RegistryId, Arc<dyn RegistryFetcher>> {
    let mut map: HashMap<RegistryId, Arc<dyn RegistryFetcher>> = HashMap::new();
    map.insert(RegistryId::Fda, Arc::new(fda::FdaFetcher::new()));
    map.insert(RegistryId::Ewg, Arc::new(ewg::EwgFetcher::new()));
    map.insert(RegistryId::Cir, Arc::new(cir::CirFetcher::new()));
    map.insert(RegistryId::Sccs, Arc::new(sccs::SccsFetcher::new()));
    map.insert(RegistryId::Iccr, Arc::new(iccr::IccrFetcher::new()));
    map.insert(RegistryId::PubChem, Arc::new(pubchem::PubChemFetcher::new()));
    map.insert(RegistryId::InciBeauty, Arc::new(inci_beauty::InciBeautyFetcher::new()));
    map
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(default_config_path);
    let config = iie_core::EngineConfig::load(config_path.as_deref())?;
    let kv = Arc::new(InMemoryKv::new());
    let l3 = Arc::new(InMemoryKv::new());
    let durable = Arc::new(InMemoryDurableStore::new());
    let engine =
        EngineHandle::with_l3(config, Some(kv), Some(l3), Some(durable), real_fetchers()).await;

    match cli.command {
        Command::Analyze { ingredients, condition, no_substitutes, deadline_ms } => {
            let opts = AnalyzeOptions {
                include_substitutes: !no_substitutes,
                deadline: deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms)),
                ..AnalyzeOptions::default()
            };
            let analysis = engine.analyze(&ingredients, &condition, opts).await;
            print_json_or(cli.json, &analysis, || render_analysis(&analysis));
        }
        Command::Substitutes { ingredient, condition, k } => {
            let candidates = engine.substitutes(&ingredient, &condition, k).await;
            print_json_or(cli.json, &candidates, || render_substitutes(&ingredient, &candidates));
        }
        Command::Profile { ingredient } => match engine.profile(&ingredient).await {
            Some(profile) => print_json_or(cli.json, &profile, || format!("{profile:#?}")),
            None => println!("could not normalize {ingredient:?}"),
        },
        Command::Health => {
            let snapshot = engine.health_snapshot().await;
            print_json_or(cli.json, &snapshot, || snapshot.to_markdown());
        }
    }

    Ok(())
}

fn print_json_or<T: serde::Serialize>(json: bool, value: &T, markdown: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to serialize output: {e}"),
        }
    } else {
        println!("{}", markdown());
    }
}

fn render_analysis(analysis: &iie_core::Analysis) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "aggregate safety score: {:.1}{}\n\n",
        analysis.aggregate_safety_score,
        if analysis.partial { " (partial — deadline reached)" } else { "" }
    ));
    out.push_str("| Ingredient | Canonical | Risk | Safety |\n");
    out.push_str("|---|---|---|---|\n");
    for result in &analysis.per_ingredient {
        let canonical = result.canonical.as_ref().map(|c| c.as_str()).unwrap_or("—");
        let (risk, safety) = result
            .profile
            .as_ref()
            .map(|p| (p.risk_level.to_string(), format!("{:.1}", p.safety_score)))
            .unwrap_or_else(|| ("—".into(), "—".into()));
        out.push_str(&format!("| {} | {canonical} | {risk} | {safety} |\n", result.raw));
    }
    if !analysis.problematic.is_empty() {
        out.push_str("\nproblematic ingredients:\n");
        for name in &analysis.problematic {
            out.push_str(&format!("- {name}\n"));
            if let Some(candidates) = analysis.substitution_map.get(name.as_str()) {
                for candidate in candidates {
                    out.push_str(&format!("    -> {} ({})\n", candidate.candidate, candidate.reason));
                }
            }
        }
    }
    out
}

fn render_substitutes(ingredient: &str, candidates: &[iie_core::SubstitutionCandidate]) -> String {
    let mut out = format!("substitutes for {ingredient}:\n\n");
    for candidate in candidates {
        out.push_str(&format!(
            "- {} (confidence {:.2}) — {}\n",
            candidate.candidate, candidate.confidence, candidate.reason
        ));
    }
    if candidates.is_empty() {
        out.push_str("(no qualifying candidates)\n");
    }
    out
}
