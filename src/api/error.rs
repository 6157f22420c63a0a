//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Invalid request parameters
    InvalidRequest(String),

    /// Resource not found, or a transition was a no-op
    NotFound(String),

    /// Storage operation failed
    StorageError(String),

    /// Store unreachable
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::StorageError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<crate::storage::StoreError> for ApiError {
    fn from(err: crate::storage::StoreError) -> Self {
        ApiError::StorageError(err.to_string())
    }
}

impl From<crate::lifecycle::CreateError> for ApiError {
    fn from(err: crate::lifecycle::CreateError) -> Self {
        match err {
            crate::lifecycle::CreateError::Invalid(msg) => ApiError::InvalidRequest(msg),
            crate::lifecycle::CreateError::Store(e) => ApiError::StorageError(e.to_string()),
        }
    }
}
