//! API error mapping
//!
//! Store errors keep their distinguishable kinds all the way to the wire:
//! NotFound → 404, Conflict → 409, InvalidInput → 400, anything internal →
//! 500. Bodies are always `{"error": ...}` JSON.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use supra_engine::db::StoreError;

/// Error type returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("inference backend error: {0}")]
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Store(StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Store(StoreError::InvalidInput(_)) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Store(StoreError::Database(_)) | ApiError::Store(StoreError::Io(_)) => {
                tracing::error!("store error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
