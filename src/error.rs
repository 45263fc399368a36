//! Core error taxonomy with HTTP status code mapping.
//!
//! [`CoreError`] is the central error type. The session manager and the
//! instrumentation wrapper only annotate and re-raise; the lifecycle
//! orchestrator is the one place a dependency failure becomes fatal to
//! process readiness. HTTP responses never carry the internal error
//! string — operators get the detail from the structured log, correlated
//! by id.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::lifecycle::Stage;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": "Internal Server Error",
///   "message": "an internal error occurred",
///   "correlation_id": "6f1c…"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Short error category.
    pub error: &'static str,
    /// Generic, client-safe message.
    pub message: &'static str,
    /// Identifier correlating this response with the full log record.
    pub correlation_id: Uuid,
}

/// Central error enum for the resource-orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed or unsafe configuration. Fatal before any dependency
    /// connects.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pool acquisition timed out. Transient; the caller may retry with
    /// backoff.
    #[error("database connection pool exhausted")]
    PoolExhausted,

    /// A unit of database work failed after a guaranteed rollback.
    #[error("session error: {0}")]
    Session(#[source] sqlx::Error),

    /// A named dependency failed to become ready during startup.
    #[error("startup failed at stage {stage}: {message}")]
    StageStartup {
        /// The stage that failed.
        stage: Stage,
        /// Failure description from the underlying client.
        message: String,
    },

    /// A destructive operation was attempted outside testing mode.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status code this variant maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::Config(_)
            | Self::Session(_)
            | Self::StageStartup { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic, client-safe message. The internal detail is logged, never
    /// returned.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::PoolExhausted => "service temporarily overloaded, retry later",
            Self::Permission(_) => "operation not permitted",
            _ => "an internal error occurred",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4();
        tracing::error!(
            error = %self,
            %correlation_id,
            "request failed"
        );
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error"),
            message: self.public_message(),
            correlation_id,
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhausted_maps_to_503() {
        assert_eq!(
            CoreError::PoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn public_message_never_echoes_internal_detail() {
        let err = CoreError::Internal("postgres://user:hunter2@db/prod".to_string());
        assert!(!err.public_message().contains("hunter2"));
    }
}
