//! Error types for the cache coherence core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Durable Tier Errors ==
/// Faults raised by a durable tier backend.
///
/// These never cross the `CacheEngine` boundary: the engine logs them and
/// keeps serving from memory.
#[derive(Error, Debug)]
pub enum DurableError {
    #[error("durable tier I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("durable tier serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("durable tier unavailable: {0}")]
    Unavailable(String),
}

// == Change Transport Errors ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refused to open a channel
    #[error("failed to open channel: {0}")]
    Open(String),

    /// The transport is shut down
    #[error("transport closed")]
    Closed,
}

// == Remote Data-Access Errors ==
/// Errors returned by remote fetch/mutate collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or server-side transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote store rejected the payload
    #[error("validation error: {0}")]
    Validation(String),

    /// The caller is not allowed to perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    /// Returns true for transient failures a collaborator may retry.
    ///
    /// Authentication and validation failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

// == Change Event Errors ==
/// Errors raised while decoding a raw transport change into a `ChangeEvent`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("change on '{0}' carries neither a before nor an after record")]
    MissingPayload(String),

    #[error("unable to resolve scope for change on '{0}'")]
    UnresolvedScope(String),
}

// == Rollback Errors ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollbackError {
    /// The snapshot was taken from a different query cache instance
    #[error("snapshot {snapshot} does not belong to cache {cache}")]
    ForeignSnapshot { snapshot: u64, cache: u64 },
}

// == Mutation Errors ==
/// Failure of an optimistic mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("mutation failed (rolled back: {rolled_back}): {source}")]
pub struct MutationError {
    /// The remote failure that aborted the mutation
    #[source]
    pub source: RemoteError,
    /// Whether the cached snapshot was restored
    pub rolled_back: bool,
}

// == Admin API Errors ==
/// Error type for the admin HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport refused the operation
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for admin API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_retry_classes() {
        assert!(RemoteError::Transport("timeout".into()).is_retryable());
        assert!(!RemoteError::Validation("bad status".into()).is_retryable());
        assert!(!RemoteError::Unauthorized("expired".into()).is_retryable());
    }

    #[test]
    fn test_api_error_status_codes() {
        let response = ApiError::InvalidRequest("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Transport(TransportError::Closed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
