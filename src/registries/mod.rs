pub mod cir;
pub mod ewg;
pub mod fda;
pub mod iccr;
pub mod inci_beauty;
pub mod pubchem;
pub mod sccs;

use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;

use crate::error::FetchOutcome;

/// Shared response-handling helper: maps a transport-level send result
/// plus an HTTP status into the `FetchOutcome` taxonomy every fetcher
/// needs, so each registry module only has to express how it turns a
/// 200 body into a `RegistryFragment`.
pub(super) async fn send_get(
    client: &ClientWithMiddleware,
    url: &str,
) -> Result<reqwest::Response, FetchOutcome> {
    let resp = client.get(url).send().await.map_err(|e| FetchOutcome::transient(e.to_string()))?;

    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FetchOutcome::NotFound);
    }
    if status.as_u16() == 429 {
        return Err(FetchOutcome::Transient {
            reason: format!("status {status}"),
            retry_after: parse_retry_after(&resp),
        });
    }
    if status.as_u16() >= 500 || status.as_u16() == 408 {
        return Err(FetchOutcome::transient(format!("status {status}")));
    }
    if !status.is_success() {
        return Err(FetchOutcome::Permanent {
            status: Some(status.as_u16()),
            message: format!("status {status}"),
        });
    }
    Ok(resp)
}

/// Parses a `Retry-After` header per RFC 9110 §10.2.3: either an integer
/// number of seconds, or an HTTP-date. This crate only honors the
/// delay-seconds form (the one every registry this engine talks to
/// actually sends on rate-limit responses); an HTTP-date value is
/// ignored and the registry's configured backoff is used instead.
fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    let value = resp.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

pub(super) async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, FetchOutcome> {
    resp.json::<T>().await.map_err(|e| FetchOutcome::Permanent {
        status: None,
        message: format!("decoding response body: {e}"),
    })
}

pub(super) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::transport::shared_client;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn honors_delay_seconds_retry_after_on_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
            .mount(&server)
            .await;

        let err = send_get(shared_client(), &server.uri()).await.unwrap_err();
        match err {
            FetchOutcome::Transient { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(120)));
            }
            other => panic!("expected Transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ignores_http_date_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "Wed, 21 Oct 2026 07:28:00 GMT"),
            )
            .mount(&server)
            .await;

        let err = send_get(shared_client(), &server.uri()).await.unwrap_err();
        match err {
            FetchOutcome::Transient { retry_after, .. } => assert_eq!(retry_after, None),
            other => panic!("expected Transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_retry_after_header_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(429)).mount(&server).await;

        let err = send_get(shared_client(), &server.uri()).await.unwrap_err();
        match err {
            FetchOutcome::Transient { retry_after, .. } => assert_eq!(retry_after, None),
            other => panic!("expected Transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_429_server_error_has_no_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let err = send_get(shared_client(), &server.uri()).await.unwrap_err();
        match err {
            FetchOutcome::Transient { retry_after, .. } => assert_eq!(retry_after, None),
            other => panic!("expected Transient, got {other:?}"),
        }
    }
}
