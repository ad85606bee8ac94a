//! Centralized error types for the VJ server core library.
//!
//! Mirrors the teacher crate's error design: structured `thiserror` enums,
//! a machine-readable `code()`, and `IntoResponse` for the HTTP-surfaced
//! subset (health/metrics/admin HTTP). WebSocket-surfaced failures are
//! represented separately as [`CloseReason`] since they never produce an
//! HTTP response once the socket has upgraded.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the VJ server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum VjError {
    /// An auth config entry has a plaintext (unrecognized-prefix) secret
    /// while `require_auth` is set.
    #[error("Plaintext secret detected in auth config: {0}")]
    PlaintextSecret(String),

    /// Auth config file could not be read or parsed.
    #[error("Failed to load auth config: {0}")]
    AuthConfig(String),

    /// Banner profile persistence failed.
    #[error("Banner profile error: {0}")]
    Banner(String),

    /// Renderer connection or request failed.
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Server configuration error (missing or invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VjError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlaintextSecret(_) => "plaintext_secret",
            Self::AuthConfig(_) => "auth_config_error",
            Self::Banner(_) => "banner_error",
            Self::Renderer(_) => "renderer_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PlaintextSecret(_) | Self::AuthConfig(_) | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Banner(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type VjResult<T> = Result<T, VjError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for VjError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Reason a server-initiated WebSocket close was issued.
///
/// Unlike [`VjError`], this never flows through `IntoResponse` — sockets
/// have no HTTP response path once upgraded. See `protocol_constants` for
/// the documented close-code values.
#[derive(Debug, Clone)]
pub struct CloseReason {
    pub code: u16,
    pub message: String,
}

impl CloseReason {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_secret_is_service_unavailable() {
        let err = VjError::PlaintextSecret("dj:alice".into());
        assert_eq!(err.code(), "plaintext_secret");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn banner_error_is_bad_request() {
        let err = VjError::Banner("bad png".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
