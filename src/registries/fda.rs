use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, read_json, send_get};

const DEFAULT_BASE: &str = "https://api.fda.gov";

#[derive(Debug, Deserialize)]
struct OpenFdaSearchResponse {
    #[serde(default)]
    results: Vec<OpenFdaResult>,
}

#[derive(Debug, Deserialize)]
struct OpenFdaResult {
    #[serde(default)]
    substance_name: Vec<String>,
    #[serde(default)]
    products: Vec<OpenFdaProduct>,
}

#[derive(Debug, Deserialize)]
struct OpenFdaProduct {
    #[serde(default)]
    marketing_status: Option<String>,
}

/// Fetcher for the FDA registry: queries the openFDA substance-search
/// endpoint for an ingredient's listed cosmetic/drug-component status.
pub struct FdaFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl FdaFetcher {
    pub fn new() -> Self {
        FdaFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_FDA_BASE") }
    }
}

impl Default for FdaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for FdaFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::Fda
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let query = format!(
            "{}/drug/ndc.json?search=substance_name:%22{}%22&limit=1",
            self.base,
            urlencode(canonical_name)
        );
        let resp = send_get(self.client, &query).await?;
        let parsed: OpenFdaSearchResponse = read_json(resp).await?;

        let Some(result) = parsed.results.into_iter().next() else {
            return Err(FetchOutcome::NotFound);
        };

        let approved = result
            .products
            .iter()
            .any(|p| p.marketing_status.as_deref().map(|s| s.eq_ignore_ascii_case("prescription") || s.eq_ignore_ascii_case("otc monograph final") || s.eq_ignore_ascii_case("otc monograph not final")).unwrap_or(false));

        Ok(RegistryFragment {
            registry_id: RegistryId::Fda,
            fetched_at: now_unix(),
            risk_level: Some(if approved { RiskLevel::Safe } else { RiskLevel::Unknown }),
            eco_score: None,
            status: Some(if approved { "approved".to_string() } else { "listed".to_string() }),
            concerns: vec![],
            raw_text: None,
            source_urls: vec![query],
        })
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_approved_product_to_safe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/ndc.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "substance_name": ["WATER"],
                    "products": [{"marketing_status": "OTC monograph final"}]
                }]
            })))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_FDA_BASE", server.uri());
        }
        let fetcher = FdaFetcher::new();
        let fragment = fetcher.fetch("water").await.unwrap();
        assert_eq!(fragment.risk_level, Some(RiskLevel::Safe));
        unsafe {
            std::env::remove_var("IIE_FDA_BASE");
        }
    }

    #[tokio::test]
    async fn no_results_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/ndc.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_FDA_BASE", server.uri());
        }
        let fetcher = FdaFetcher::new();
        let result = fetcher.fetch("unobtainium").await;
        assert_eq!(result.unwrap_err(), FetchOutcome::NotFound);
        unsafe {
            std::env::remove_var("IIE_FDA_BASE");
        }
    }
}
