use std::time::Duration;

use thiserror::Error;

use crate::types::RegistryId;

/// Crate-wide error type. Every fallible operation in this crate returns
/// `Result<_, IieError>`; the orchestrator downgrades most registry-origin
/// variants into missing-fragment bookkeeping rather than propagating them.
#[derive(Debug, Error)]
pub enum IieError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("{registry:?} has no record for {canonical_name:?}")]
    NotFound {
        registry: RegistryId,
        canonical_name: String,
    },

    #[error("{registry:?} transient failure: {reason}")]
    Transient { registry: RegistryId, reason: String },

    #[error("{registry:?} permanent failure ({status:?}): {message}")]
    Permanent {
        registry: RegistryId,
        status: Option<u16>,
        message: String,
    },

    #[error("circuit open for {registry:?}")]
    CircuitOpen { registry: RegistryId },

    #[error("engine overloaded")]
    Overloaded,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("http client construction failed: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IieError {
    /// Whether this error, if produced by a registry fetch, is eligible for
    /// retry by the resilience layer's `RetryPolicy`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IieError::Transient { .. })
    }
}

/// Outcome of one `RegistryFetcher::fetch` call, distinct from `IieError`
/// because the resilience layer needs to branch on it before deciding
/// whether to retry, without paying for a full error allocation on the
/// common "not found" path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    NotFound,
    /// `retry_after` carries a `Retry-After` value read off a `429`
    /// response, per spec §4.4 ("On 429, honor `Retry-After` if
    /// present."); `None` means fall back to the registry's configured
    /// backoff schedule.
    Transient { reason: String, retry_after: Option<Duration> },
    Permanent { status: Option<u16>, message: String },
}

impl FetchOutcome {
    /// Constructs a `Transient` outcome with no `Retry-After` hint, the
    /// common case (transport errors, 5xx, 408, and 429s with no or an
    /// unparsable header).
    pub fn transient(reason: impl Into<String>) -> Self {
        FetchOutcome::Transient { reason: reason.into(), retry_after: None }
    }

    pub fn into_error(self, registry: RegistryId, canonical_name: &str) -> IieError {
        match self {
            FetchOutcome::NotFound => IieError::NotFound {
                registry,
                canonical_name: canonical_name.to_string(),
            },
            FetchOutcome::Transient { reason, .. } => IieError::Transient { registry, reason },
            FetchOutcome::Permanent { status, message } => {
                IieError::Permanent { registry, status, message }
            }
        }
    }
}
