use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, read_json, send_get};

const DEFAULT_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "PropertyTable")]
    property_table: PropertyTableInner,
}

#[derive(Debug, Deserialize)]
struct PropertyTableInner {
    #[serde(rename = "Properties")]
    properties: Vec<CompoundProperties>,
}

#[derive(Debug, Deserialize)]
struct CompoundProperties {
    #[serde(rename = "CID")]
    cid: i64,
    #[serde(rename = "XLogP")]
    xlogp: Option<f64>,
    #[serde(rename = "IUPACName")]
    iupac_name: Option<String>,
}

/// Fetcher for PubChem: resolves a name to a compound ID and its
/// computed properties via the PUG REST API. `XLogP` (octanol-water
/// partition coefficient) is used as a rough, conservative proxy for
/// environmental persistence when no registry-native eco figure
/// exists -- higher values indicate greater bioaccumulation potential.
pub struct PubChemFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl PubChemFetcher {
    pub fn new() -> Self {
        PubChemFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_PUBCHEM_BASE") }
    }
}

impl Default for PubChemFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for PubChemFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::PubChem
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!(
            "{}/compound/name/{}/property/XLogP,IUPACName/JSON",
            self.base,
            canonical_name.replace(' ', "%20")
        );
        let resp = send_get(self.client, &url).await?;
        let parsed: PropertyTable = read_json(resp).await?;

        let Some(props) = parsed.property_table.properties.into_iter().next() else {
            return Err(FetchOutcome::NotFound);
        };

        // Lower XLogP -> more water-soluble -> treated as more eco-friendly.
        // Scale loosely over [-2, 8], clamp to [0, 100].
        let eco_score = props
            .xlogp
            .map(|x| (100.0 - ((x + 2.0) / 10.0) * 100.0).clamp(0.0, 100.0))
            .unwrap_or(50.0);

        Ok(RegistryFragment {
            registry_id: RegistryId::PubChem,
            fetched_at: now_unix(),
            risk_level: None,
            eco_score: Some(eco_score),
            status: Some(format!("cid {}", props.cid)),
            concerns: vec![],
            raw_text: props.iupac_name,
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
    async fn maps_low_xlogp_to_high_eco_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "PropertyTable": {
                    "Properties": [{"CID": 962, "XLogP": -1.38, "IUPACName": "oxidane"}]
                }
            })))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_PUBCHEM_BASE", server.uri());
        }
        let fetcher = PubChemFetcher::new();
        let fragment = fetcher.fetch("water").await.unwrap();
        assert!(fragment.eco_score.unwrap() > 50.0);
        unsafe {
            std::env::remove_var("IIE_PUBCHEM_BASE");
        }
    }
}
