//! Error taxonomy shared by every stage of the proxy pipeline.

use http::StatusCode;
use thiserror::Error;

/// Failure categories produced by the proxy.
///
/// Each variant maps to one HTTP status class via [`ProxyError::status_code`].
/// Backend failures carry the upstream status when one was received so the
/// caller sees exactly what the backend returned.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The caller presented no credential or an unknown one.
    #[error("Invalid or missing API key")]
    Unauthenticated,

    /// The caller's credential exists but has been disabled.
    #[error("API key has been disabled")]
    Forbidden,

    /// A request or query parameter is malformed or self-contradictory.
    #[error("{0}")]
    InvalidArgument(String),

    /// An admin operation referenced a user that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The admission gate did not grant a slot within the configured wait.
    #[error("Server is at capacity, try again later")]
    Unavailable,

    /// The backend returned a non-success status or could not be reached
    /// before any bytes were relayed to the caller.
    #[error("Backend request failed: {message}")]
    Backend {
        /// Upstream status, when a response was received at all.
        status: Option<StatusCode>,
        /// Human-readable failure description.
        message: String,
    },

    /// The backend connection failed after bytes were already relayed.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The ledger store could not be read or written.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The process configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// Build an [`ProxyError::InvalidArgument`] from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Build a [`ProxyError::NotFound`] from any message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Backend failure with a relayed upstream status.
    pub fn backend(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Backend {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Backend failure before any response was received.
    pub fn backend_unreachable(source: impl std::fmt::Display) -> Self {
        Self::Backend {
            status: None,
            message: source.to_string(),
        }
    }

    /// Build a [`ProxyError::StreamInterrupted`] from any message.
    pub fn stream_interrupted(message: impl Into<String>) -> Self {
        Self::StreamInterrupted(message.into())
    }

    /// Build a [`ProxyError::Persistence`] from an underlying store error.
    pub fn persistence(source: impl std::fmt::Display) -> Self {
        Self::Persistence(source.to_string())
    }

    /// Build a [`ProxyError::Configuration`] from any message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// HTTP status the caller observes for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Backend { status, .. } => status.unwrap_or(StatusCode::BAD_GATEWAY),
            Self::StreamInterrupted(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for error bodies and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Unavailable => "unavailable",
            Self::Backend { .. } => "backend_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}
