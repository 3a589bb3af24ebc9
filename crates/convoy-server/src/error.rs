//! HTTP error mapping.
//!
//! Every failed request answers with `{"error": CODE, "message": text}`.
//! Internal failures are logged in full and redacted on the wire.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use convoy_core::{ConvoyError, ErrorKind};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Per-email verification request limit hit.
pub const RATE_LIMIT_EMAIL: &str = "RATE_LIMIT_EMAIL";
/// Per-address verification request limit hit.
pub const RATE_LIMIT_IP: &str = "RATE_LIMIT_IP";
/// Server is draining and refuses new work.
pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";

/// Wire body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub error: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A domain failure from the store or verification flow.
    #[error(transparent)]
    Domain(#[from] ConvoyError),
    /// A rate limit tripped; carries the limit's code.
    #[error("rate limited ({0})")]
    RateLimited(&'static str),
    /// The server is shutting down.
    #[error("server is shutting down")]
    Unavailable,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Domain(ConvoyError::invalid(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Domain(ConvoyError::invalid(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Domain(ConvoyError::invalid(rejection.body_text()))
    }
}

/// Status code for a domain error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// Status and body for this error.
    pub fn parts(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Domain(err) => {
                let status = status_for(err.kind());
                let message = if err.kind() == ErrorKind::Internal {
                    error!(error = %err, "internal error");
                    "internal error".to_owned()
                } else {
                    err.to_string()
                };
                (
                    status,
                    ErrorBody {
                        error: err.code(),
                        message,
                    },
                )
            }
            Self::RateLimited(code) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: *code,
                    message: "too many verification requests, try again later".into(),
                },
            ),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: SHUTTING_DOWN,
                    message: "server is shutting down".into(),
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}
