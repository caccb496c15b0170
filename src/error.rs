//! Typed error hierarchy for the engine (§7).
//!
//! The mapping to an HTTP status is provided for the (external) HTTP layer
//! to consume; this crate never constructs an HTTP response itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no model mapping resolves '{0}'")]
    UnsupportedModel(String),

    #[error("request has no user or assistant messages")]
    EmptyMessages,

    #[error("no available account in the pool")]
    NoAvailableAccount,

    #[error("refresh token for account {0} was revoked")]
    TokenRevoked(String),

    #[error("upstream rate-limited account {0}")]
    UpstreamRateLimited(String),

    #[error("upstream rejected the request after fallback exhaustion: {summary}")]
    UpstreamRejected { summary: String },

    #[error("transient upstream failure: {0}")]
    UpstreamTransient(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// HTTP status the external server layer should surface to the caller.
    ///
    /// `ConfigurationError` has no status: per §7 it is logged, not surfaced.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnsupportedModel(_) => Some(400),
            Self::EmptyMessages => Some(400),
            Self::NoAvailableAccount => Some(503),
            Self::TokenRevoked(_) => Some(503),
            Self::UpstreamRateLimited(_) => Some(503),
            Self::UpstreamRejected { .. } => Some(400),
            Self::UpstreamTransient(_) => Some(502),
            Self::Configuration(_) => None,
        }
    }

    /// Whether this error is local to one account and must not poison the
    /// pool (§7 propagation rule for refresh errors).
    pub fn is_account_local(&self) -> bool {
        matches!(self, Self::TokenRevoked(_) | Self::UpstreamRateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
