//! Error taxonomy for credential acquisition and detail fetching.
//!
//! Every per-identifier outcome is an explicit tagged result; nothing in the
//! fetch path catches-and-forgets. `FetchError::kind()` gives the flat
//! discriminant the aggregator tallies on.

use std::time::Duration;

use thiserror::Error;

/// Failure modes of a credential supplier (proxy resolution or auth
/// acquisition).
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The login window closed without a bearer token being observed.
    #[error("no bearer token observed within the login window")]
    NoToken,

    /// The proxy endpoint hostname did not resolve to an address.
    #[error("proxy endpoint `{host}` did not resolve: {reason}")]
    ProxyResolve { host: String, reason: String },

    /// The supplier exceeded its configured invocation deadline.
    #[error("credential acquisition timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-identifier failure classification for the fetch loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("credential acquisition failed: {0}")]
    Credential(#[from] AcquireError),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("failed to decode response body for {url}: {message}")]
    Decode { url: String, message: String },
}

/// Flat discriminant of [`FetchError`], used for report tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Credential,
    Status,
    Transport,
    Decode,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Credential(_) => FetchErrorKind::Credential,
            FetchError::Status { .. } => FetchErrorKind::Status,
            FetchError::Transport { .. } => FetchErrorKind::Transport,
            FetchError::Decode { .. } => FetchErrorKind::Decode,
        }
    }

    /// Classifies a reqwest send failure. Timeouts, connect errors and proxy
    /// failures all land in `Transport`; body-decode failures in `Decode`.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Whether a retry within the same run could plausibly succeed.
    /// 4xx statuses and credential failures are not self-healing.
    pub fn retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Credential(_) | FetchError::Decode { .. } => false,
        }
    }
}
