use async_trait::async_trait;
use regex::Regex;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::OnceLock;

use crate::capabilities::RegistryFetcher;
use crate::error::FetchOutcome;
use crate::resilience::transport::{env_base, shared_client};
use crate::types::{RegistryFragment, RegistryId, RiskLevel};

use super::{now_unix, send_get};

const DEFAULT_BASE: &str = "https://www.iccr-cosmetics.org/search";

fn mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(harmonized|under review|not addressed)").unwrap())
}

/// Fetcher for the International Cooperation on Cosmetics Regulation
/// guideline search. ICCR's guidelines describe whether a harmonized
/// international position exists for an ingredient, not a risk score
/// per se; this maps that harmonization state onto the uniform
/// fragment shape, with `risk_level` left at a neutral default since
/// ICCR does not itself render safety verdicts.
pub struct IccrFetcher {
    client: &'static ClientWithMiddleware,
    base: String,
}

impl IccrFetcher {
    pub fn new() -> Self {
        IccrFetcher { client: shared_client(), base: env_base(DEFAULT_BASE, "IIE_ICCR_BASE") }
    }
}

impl Default for IccrFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryFetcher for IccrFetcher {
    fn registry_id(&self) -> RegistryId {
        RegistryId::Iccr
    }

    async fn fetch(&self, canonical_name: &str) -> Result<RegistryFragment, FetchOutcome> {
        let url = format!("{}?q={}", self.base, canonical_name.replace(' ', "+"));
        let resp = send_get(self.client, &url).await?;
        let body = resp.text().await.map_err(|e| FetchOutcome::Permanent {
            status: None,
            message: format!("reading body: {e}"),
        })?;

        let Some(state) = mention_pattern().captures(&body).and_then(|c| c.get(1)) else {
            return Err(FetchOutcome::NotFound);
        };

        Ok(RegistryFragment {
            registry_id: RegistryId::Iccr,
            fetched_at: now_unix(),
            risk_level: Some(RiskLevel::Unknown),
            eco_score: None,
            status: Some(state.as_str().to_lowercase()),
            concerns: vec![],
            raw_text: None,
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
    async fn harmonized_state_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "This substance is Harmonized across ICCR member regions.",
            ))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("IIE_ICCR_BASE", server.uri());
        }
        let fetcher = IccrFetcher::new();
        let fragment = fetcher.fetch("glycerin").await.unwrap();
        assert_eq!(fragment.status.as_deref(), Some("harmonized"));
        unsafe {
            std::env::remove_var("IIE_ICCR_BASE");
        }
    }
}
