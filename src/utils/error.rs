//! Error Handling Utilities
//!
//! HTTP-facing error type and the fixed-shape payload returned to callers.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::service::IdentityError;

/// Application error returned by every HTTP handler
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors for user input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad credentials or missing/invalid bearer token
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Authenticated but not allowed to act on the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email or provider identity)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Password reset request missing or past its expiry
    #[error("Expired: {0}")]
    Expired(String),

    /// Password reset token did not match
    #[error("Token mismatch: {0}")]
    Mismatch(String),

    /// External service errors (mail, geolocation, OAuth provider)
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Generic internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Standard error response structure for API endpoints
///
/// This is the only shape an error ever takes on the wire. Internal variants
/// carry a fixed message; their inner text stays in the logs.
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR", msg)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::Expired(msg) => (StatusCode::GONE, "EXPIRED", msg),
            AppError::Mismatch(msg) => (StatusCode::BAD_REQUEST, "TOKEN_MISMATCH", msg),
            AppError::ExternalService(detail) => {
                log::error!("External service failure: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "EXTERNAL_SERVICE_ERROR",
                    "External service unavailable".to_string(),
                )
            }
            AppError::Internal(detail) => {
                log::error!("Internal failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::Configuration(detail) => {
                log::error!("Configuration failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Server configuration error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();
        let error_response = ErrorResponse::new(error_code, &message);
        (status, Json(error_response)).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation(msg) => AppError::Validation(msg),
            IdentityError::Conflict(msg) => AppError::Conflict(msg),
            IdentityError::Authentication(msg) => AppError::Authentication(msg),
            IdentityError::Forbidden(msg) => AppError::Forbidden(msg),
            IdentityError::NotFound(msg) => AppError::NotFound(msg),
            IdentityError::Expired(msg) => AppError::Expired(msg),
            IdentityError::Mismatch(msg) => AppError::Mismatch(msg),
            IdentityError::MailDelivery(msg) => AppError::ExternalService(msg),
            IdentityError::Provider(msg) => AppError::ExternalService(msg),
            IdentityError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Malformed request bodies and parameters keep the fixed error shape
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Result type alias for operations that can return AppError
pub type AppResult<T> = Result<T, AppError>;
