use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{FunctionalCategory, RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, read_json, send_get};

const DEFAULT_BASE: &str = "https://api.incibeauty.com";

#[derive(Debug, Deserialize)]
struct InciResponse {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    functions: Vec<String>,
    #[serde(default)]
    origin: Option<String>,
}

/// Fetcher for the INCI Beauty Pro catalog: a 30,000+ ingredient
/// database with a 0-100 "safety" score and a free-text function list.
/// Function names are mapped onto `FunctionalCategory` best-effort; an
/// unrecognized function degrades to `Other` rather than aborting the
/// fetch.
pub struct InciBeautyFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl InciBeautyFetcher {
    pub fn new() -> Self {
        InciBeautyFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_INCI_BEAUTY_BASE") }
    }
}

impl Default for InciBeautyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn map_function(name: &str) -> FunctionalCategory {
    match name.to_lowercase().as_str() {
        "emollient" => FunctionalCategory::Emollient,
        "humectant" => FunctionalCategory::Humectant,
        "emulsifying" | "emulsifier" => FunctionalCategory::Emulsifier,
        "preservative" => FunctionalCategory::Preservative,
        "antioxidant" => FunctionalCategory::Antioxidant,
        "surfactant" | "cleansing" => FunctionalCategory::Surfactant,
        "perfuming" | "fragrance" | "masking" => FunctionalCategory::Fragrance,
        "colorant" | "cosmetic colorant" => FunctionalCategory::Colorant,
        "uv filter" | "sunscreen" => FunctionalCategory::Sunscreen,
        "solvent" => FunctionalCategory::Solvent,
        _ => FunctionalCategory::Other,
    }
}

#[async_trait]
impl RegistryFetcher for InciBeautyFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::InciBeauty
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!("{}/ingredients/{}", self.base, canonical_name.replace(' ', "-"));
        let resp = send_get(self.client, &url).await?;
        let parsed: InciResponse = read_json(resp).await?;

        let score = parsed.score.unwrap_or(50.0).clamp(0.0, 100.0);
        let risk_level = if score >= 85.0 {
            RiskLevel::Safe
        } else if score >= 70.0 {
            RiskLevel::Low
        } else if score >= 50.0 {
            RiskLevel::Moderate
        } else if score >= 30.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        };

        let categories: Vec<FunctionalCategory> = parsed.functions.iter().map(|f| map_function(f)).collect();

        Ok(RegistryFragment {
            registry_id: RegistryId::InciBeauty,
            fetched_at: now_unix(),
            risk_level: Some(risk_level),
            eco_score: Some(score),
            status: parsed.origin,
            concerns: vec![],
            raw_text: Some(categories.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(",")),
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
    async fn high_score_maps_to_safe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "score": 92.0,
                "functions": ["humectant"],
                "origin": "natural"
            })))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_INCI_BEAUTY_BASE", server.uri());
        }
        let fetcher = InciBeautyFetcher::new();
        let fragment = fetcher.fetch("glycerin").await.unwrap();
        assert_eq!(fragment.risk_level, Some(RiskLevel::Safe));
        unsafe {
            std::env::remove_var("IIE_INCI_BEAUTY_BASE");
        }
    }
}
