//! API error types and conversions
//!
//! Failures of individual commands never surface here: they travel inside
//! the wire response body. These errors cover requests the bridge could not
//! even read.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mgmt_core::{ErrorKind, MgmtError};
use serde::Serialize;

/// API error type that converts to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request (body is not JSON at all)
    BadRequest(String),
    /// 503 Service Unavailable (bridge torn down)
    ServiceUnavailable(String),
    /// 500 Internal Server Error
    Internal(String),
}

/// Error body, shaped like a failed wire response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    status: u16,
    error: String,
    error_type: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidRequest.as_str(),
                msg,
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::TransportFailure.as_str(),
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::InternalInvariantViolation.as_str(),
                msg,
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = error_type, %message, "API error");
        } else {
            tracing::debug!(error = error_type, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            status: status.as_u16(),
            error: message,
            error_type,
        });

        (status, body).into_response()
    }
}

impl From<MgmtError> for ApiError {
    fn from(err: MgmtError) -> Self {
        match err {
            MgmtError::InvalidRequest(msg) | MgmtError::MalformedName(msg) => {
                ApiError::BadRequest(msg)
            }
            MgmtError::Transport(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
