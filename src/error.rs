//! Error types for the Homework Helper backend.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Homework Helper operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// LLM vendor request failed before the stream opened.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// JWT token operation failed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Account not found.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Admission gate refused the request (no credits or questions left).
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Storage-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database query failed.
    #[cfg(feature = "sqlx-storage")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic storage error for non-sqlx backends.
    #[error("storage error: {0}")]
    Other(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::Jwt(_) => (StatusCode::UNAUTHORIZED, "invalid token".to_string()),
            Error::AccountNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::AuthFailed(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::QuotaExhausted(_) => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AccountNotFound("u_123".to_string());
        assert_eq!(err.to_string(), "account not found: u_123");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Other("test error".to_string());
        assert_eq!(err.to_string(), "storage error: test error");
    }

    #[test]
    fn test_error_from_storage_error() {
        let storage_err = StorageError::Other("test".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_quota_exhausted_status() {
        let response = Error::QuotaExhausted("no questions left today".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
