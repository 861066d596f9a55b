use async_trait::async_trait;
use regex::Regex;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::OnceLock;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, send_get};

const DEFAULT_BASE: &str = "https://ec.europa.eu/health/scientific_committees/consumer_safety/opinions";

fn restriction_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(prohibited|restricted|permitted without restriction)").unwrap())
}

fn max_concentration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)maximum concentration[^0-9]*([0-9]+(?:\.[0-9]+)?)\s*%").unwrap())
}

/// Fetcher for the EU Scientific Committee on Consumer Safety opinions
/// register. Like CIR, SCCS opinions are prose documents; this fetches
/// the opinion page text and regex-matches the restriction verdict and
/// an optional maximum-concentration figure.
pub struct SccsFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl SccsFetcher {
    pub fn new() -> Self {
        SccsFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_SCCS_BASE") }
    }
}

impl Default for SccsFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for SccsFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::Sccs
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!("{}/{}", self.base, canonical_name.replace(' ', "-"));
        let resp = send_get(self.client, &url).await?;
        let body = resp.text().await.map_err(|e| FetchOutcome::Permanent {
            status: None,
            message: format!("reading body: {e}"),
        })?;

        let Some(verdict) = restriction_pattern().captures(&body).and_then(|c| c.get(1)) else {
            return Err(FetchOutcome::NotFound);
        };
        let verdict = verdict.as_str().to_lowercase();

        let mut concerns = Vec::new();
        let risk_level = match verdict.as_str() {
            "permitted without restriction" => RiskLevel::Safe,
            "restricted" => {
                if let Some(m) = max_concentration_pattern().captures(&body) {
                    concerns.push(format!("restricted to max {}% concentration", &m[1]));
                } else {
                    concerns.push("restricted use".to_string());
                }
                RiskLevel::Moderate
            }
            "prohibited" => {
                concerns.push("prohibited in the EU".to_string());
                RiskLevel::Critical
            }
            _ => RiskLevel::Unknown,
        };

        Ok(RegistryFragment {
            registry_id: RegistryId::Sccs,
            fetched_at: now_unix(),
            risk_level: Some(risk_level),
            eco_score: None,
            status: Some(verdict),
            concerns,
            raw_text: None,
            source_urls: vec![url],
        })
    }
}
