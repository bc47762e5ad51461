//! HTTP error responses
//!
//! Maps application errors to status codes. Bodies follow the Prometheus API
//! error shape and only carry the canonical reason of the status; the error
//! itself is logged by the middleware that produced it.

use crate::error::AppError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: &'static str,
    error_type: &'static str,
    error: &'static str,
}

impl AppError {
    /// Status code returned to the caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Acl(_) => StatusCode::UNAUTHORIZED,
            AppError::Rewrite(_) => StatusCode::BAD_REQUEST,
            AppError::Proxy(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Auth(_) | AppError::Acl(_) => "unauthorized",
            AppError::Rewrite(_) => "bad_data",
            AppError::Proxy(_) => "unavailable",
            AppError::Config(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.error_type())
    }
}

/// Error response with the canonical reason of `status` as message
pub fn error_response(status: StatusCode, error_type: &'static str) -> Response {
    let body = ErrorBody {
        status: "error",
        error_type,
        error: status.canonical_reason().unwrap_or("error"),
    };
    (status, Json(body)).into_response()
}
