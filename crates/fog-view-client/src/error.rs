//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Core error: {0}")]
    Core(#[from] fog_view_core::Error),
}

impl ClientError {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Server { status, .. } => *status == 503,
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let unavailable = ClientError::Server {
            status: 503,
            message: "txout index failed".into(),
        };
        let bad = ClientError::Server {
            status: 400,
            message: "Invalid query".into(),
        };
        assert!(unavailable.is_retryable());
        assert!(!bad.is_retryable());
        assert!(!ClientError::InvalidResponse("short".into()).is_retryable());
    }
}
