//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::collaborator::CollaboratorError;

/// Structured error response for API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("{name} failed: {source}")]
    Collaborator {
        name: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("{name} did not answer within {after_ms}ms")]
    Timeout { name: &'static str, after_ms: u64 },

    #[error("Codec error: {0}")]
    Codec(#[from] fog_view_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn collaborator(name: &'static str, source: CollaboratorError) -> Self {
        ServerError::Collaborator { name, source }
    }

    /// Get the error code for structured responses
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidQuery(_) => "INVALID_QUERY",
            ServerError::InvalidConfig(_) => "INVALID_CONFIG",
            ServerError::Collaborator { .. } => "COLLABORATOR_UNAVAILABLE",
            ServerError::Timeout { .. } => "COLLABORATOR_TIMEOUT",
            ServerError::Codec(_) => "CODEC_ERROR",
            ServerError::Io(_) => "IO_ERROR",
            ServerError::Json(_) => "JSON_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ServerError::Codec(_) => StatusCode::BAD_REQUEST,
            ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::Collaborator { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller should retry the same request with backoff
    pub fn is_retryable(&self) -> bool {
        self.status() == StatusCode::SERVICE_UNAVAILABLE
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_collaborator_is_retryable() {
        let err = ServerError::collaborator(
            "txout index",
            CollaboratorError::Unavailable("offline".into()),
        );
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "txout index failed: unavailable: offline");
    }

    #[test]
    fn test_invalid_query_is_permanent() {
        let err = ServerError::InvalidQuery("negative event cursor".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_QUERY");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_maps_to_503() {
        let err = ServerError::Timeout {
            name: "rng directory",
            after_ms: 250,
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "COLLABORATOR_TIMEOUT");
    }
}
