use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use reader::ReaderError;

/// Failures raised before a response has started streaming.
///
/// Once a body is in flight, failures can only end the stream; they never
/// become one of these.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Convenience type alias
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Status and structured error code. Internal details are logged, not returned.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string()),
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl From<ReaderError> for ApiError {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::NotFound(path) => ApiError::NotFound(
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            ReaderError::InvalidPattern(e) => ApiError::InvalidRequest(e.to_string()),
            ReaderError::Io(e) => ApiError::Internal(format!("failed to open log file: {}", e)),
        }
    }
}
