//! Error types for orderwatch-lookup

use crate::services::LookupError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., lookup still running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Monitoring service failed (502)
    #[error("Remote service error: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::SessionNotFound(_) | LookupError::RecordNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            LookupError::NotReady(_) => ApiError::Conflict(e.to_string()),
            LookupError::Remote(inner) => ApiError::BadGateway(inner.to_string()),
            LookupError::BulkRemark(inner) => ApiError::BadRequest(inner.to_string()),
            LookupError::Export(inner) => ApiError::Internal(inner.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "REMOTE_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
