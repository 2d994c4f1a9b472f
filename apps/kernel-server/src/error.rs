// apps/kernel-server/src/error.rs
// Purpose: Crate-wide error kinds and their mapping onto HTTP responses.
// Architecture: Cross-cutting error layer
// Dependencies: thiserror, Axum

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failures a `Store` implementation can surface. Never raised for "not
/// found on read by id" -- callers get `Ok(None)` for that case instead
/// (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid data: {0}")]
    Invalid(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<crate::models::ModelParseError> for StoreError {
    fn from(e: crate::models::ModelParseError) -> Self {
        StoreError::Invalid(e.to_string())
    }
}

/// The error kinds enumerated in spec.md §7, unified into one type so
/// every handler in `server/handlers.rs` can return `Result<T, ApiError>`
/// and let Axum render the response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => ApiError::StoreFailure(msg),
            StoreError::Conflict(msg) => ApiError::InvalidInput(msg),
            StoreError::Invalid(msg) => ApiError::InvalidInput(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::UpstreamUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::StoreFailure(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
