//! Error taxonomy for the optimization pipeline and sidecar.
//!
//! Construction-time failures (bad A/B weights, malformed routing config)
//! are surfaced to the host via `SlimClawError`. Everything downstream of
//! construction — classification, windowing, routing, cache annotation —
//! has a total fallback and never produces an error the orchestrator can't
//! absorb; see `Orchestrator::optimize`.

use thiserror::Error;

/// Stable machine-readable error identifiers, mirrored in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidConfig,
    BadRequest,
    UpstreamTransport,
    UpstreamTimeout,
    UnknownProvider,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::UpstreamTransport => "upstream_transport",
            ErrorCode::UpstreamTimeout => "upstream_timeout",
            ErrorCode::UnknownProvider => "unknown_provider",
            ErrorCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum SlimClawError {
    /// Invalid configuration discovered at construction time (A/B weights
    /// not summing to 100, unknown tier referenced, malformed provider
    /// pattern). Fails fast — never raised mid-request.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The inbound HTTP request body could not be parsed or named a
    /// non-virtual model.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// DNS/connect/reset talking to an upstream provider.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The configured forwarder timeout elapsed before the upstream
    /// responded.
    #[error("upstream timeout after {0:?}")]
    UpstreamTimeout(std::time::Duration),

    /// `targetProvider` has no known credentials.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Caught by the orchestrator's top-level fallback; should never
    /// escape to an HTTP caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SlimClawError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SlimClawError::Config(_) => ErrorCode::InvalidConfig,
            SlimClawError::BadRequest(_) => ErrorCode::BadRequest,
            SlimClawError::UpstreamTransport(_) => ErrorCode::UpstreamTransport,
            SlimClawError::UpstreamTimeout(_) => ErrorCode::UpstreamTimeout,
            SlimClawError::UnknownProvider(_) => ErrorCode::UnknownProvider,
            SlimClawError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status the sidecar should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SlimClawError::Config(_) => 500,
            SlimClawError::BadRequest(_) => 400,
            SlimClawError::UpstreamTransport(_) => 502,
            SlimClawError::UpstreamTimeout(_) => 504,
            SlimClawError::UnknownProvider(_) => 502,
            SlimClawError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SlimClawError>;
