use std::sync::OnceLock;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::error::IieError;

/// Process-wide HTTP client shared by every registry fetcher, built
/// once and reused so connection pooling actually pools. Mirrors the
/// `OnceLock<reqwest::Client>` double-checked-init pattern used for
/// health-check clients elsewhere in this codebase, generalized to the
/// `reqwest_middleware` client type the Resilience Layer wraps with its
/// own circuit-breaking and retry.
pub fn shared_client() -> &'static ClientWithMiddleware {
    static CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();
    CLIENT.get_or_init(|| build_client().expect("building the shared HTTP client must not fail"))
}

fn build_client() -> Result<ClientWithMiddleware, IieError> {
    let inner = reqwest::Client::builder()
        .user_agent(concat!("iie-core/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(IieError::HttpClientInit)?;
    Ok(ClientBuilder::new(inner).build())
}

/// Resolves a registry's base URL: an `<ENV_VAR>` override (used in
/// tests to redirect at a `wiremock` server) falling back to the
/// registry's real production base.
pub fn env_base(default_base: &str, env_var: &str) -> String {
    std::env::var(env_var).unwrap_or_else(|_| default_base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_base_prefers_override() {
        // SAFETY: single-threaded test, no other test touches this var.
        unsafe {
            std::env::set_var("IIE_TEST_BASE_URL", "http://localhost:1234");
        }
        assert_eq!(env_base("https://example.com", "IIE_TEST_BASE_URL"), "http://localhost:1234");
        unsafe {
            std::env::remove_var("IIE_TEST_BASE_URL");
        }
        assert_eq!(env_base("https://example.com", "IIE_TEST_BASE_URL"), "https://example.com");
    }
}
