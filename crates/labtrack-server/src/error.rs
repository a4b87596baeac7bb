//! HTTP error responses
//!
//! Every error leaves the service as `{"error": "<message>"}` with a status
//! code picked from the error category.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labtrack_core::{ErrorCategory, StoreError};

/// An error rendered as a JSON response
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err.category() {
            ErrorCategory::BadRequest => match err {
                StoreError::InvalidKind(_) => ApiError::bad_request("Invalid data type"),
                other => ApiError::bad_request(other.to_string()),
            },
            ErrorCategory::NotFound => ApiError::not_found("Item not found"),
            ErrorCategory::InternalError => {
                tracing::error!("Record store failure: {}", err);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
