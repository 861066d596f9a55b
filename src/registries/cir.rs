use async_trait::async_trait;
use regex::Regex;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::OnceLock;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, send_get};

const DEFAULT_BASE: &str = "https://www.cir-safety.org/search";

fn verdict_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(safe as used|safe with qualifications|unsafe|insufficient data)").unwrap()
    })
}

/// Fetcher for the Cosmetic Ingredient Review panel. CIR publishes its
/// opinions as prose documents rather than a structured API, so this
/// fetches the search results page and extracts the panel's verdict
/// phrase with a regex rather than a full HTML parser -- the same
/// "fetch page, regex for a known phrase" shape the rest of this
/// codebase uses for inherently document-oriented sources.
pub struct CirFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl CirFetcher {
    pub fn new() -> Self {
        CirFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_CIR_BASE") }
    }
}

impl Default for CirFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for CirFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::Cir
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!("{}?q={}", self.base, canonical_name.replace(' ', "+"));
        let resp = send_get(self.client, &url).await?;
        let body = resp.text().await.map_err(|e| FetchOutcome::Permanent {
            status: None,
            message: format!("reading body: {e}"),
        })?;

        let Some(verdict) = verdict_pattern().captures(&body).and_then(|c| c.get(1)) else {
            return Err(FetchOutcome::NotFound);
        };
        let verdict = verdict.as_str().to_lowercase();

        let risk_level = match verdict.as_str() {
            "safe as used" => RiskLevel::Safe,
            "safe with qualifications" => RiskLevel::Low,
            "insufficient data" => RiskLevel::Unknown,
            "unsafe" => RiskLevel::High,
            _ => RiskLevel::Unknown,
        };

        Ok(RegistryFragment {
            registry_id: RegistryId::Cir,
            fetched_at: now_unix(),
            risk_level: Some(risk_level),
            eco_score: None,
            status: Some(verdict),
            concerns: vec![],
            raw_text: None,
            source_urls: vec![url],
        })
    }
}
