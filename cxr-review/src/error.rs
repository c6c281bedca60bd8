//! HTTP error mapping
//!
//! Every handler error becomes `{"error": {"code", "message"}}` with a status
//! derived from the domain error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cxr_common::Error;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not be interpreted (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Domain or infrastructure error
    #[error(transparent)]
    Common(#[from] Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Common(err) => match err {
                Error::SubjectNotFound(_) => (StatusCode::NOT_FOUND, "SUBJECT_NOT_FOUND"),
                Error::ArtifactNotFound(_) => (StatusCode::NOT_FOUND, "ARTIFACT_NOT_FOUND"),
                Error::UnknownLabel(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_LABEL"),
                Error::InvalidImage(_) => (StatusCode::BAD_REQUEST, "INVALID_IMAGE"),
                Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                Error::ModelUnavailable { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "MODEL_UNAVAILABLE")
                }
                Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
                Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        if status.is_server_error() {
            tracing::error!(code = error_code, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
