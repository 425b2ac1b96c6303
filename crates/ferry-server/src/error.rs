//! API error types.
//!
//! Every error is answered with HTTP 200 and a `{ "error": ... }` body so
//! callers always receive a parseable answer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use ferry_fetch::FetchError;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is not valid JSON.
    #[error("invalid request body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The request named no target.
    #[error("URL is required")]
    MissingUrl,

    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidMethod(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(msg) = &self {
            warn!(error = %msg, "Relay request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = ApiError::from(FetchError::InvalidMethod("GE T".to_string()));
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = ApiError::from(FetchError::Client("tls".to_string()));
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn errors_use_status_200() {
        let response = ApiError::MissingUrl.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
