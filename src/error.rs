//! # Error Handling
//!
//! Custom error types and their conversion to HTTP responses.
//!
//! ## Error Categories:
//! - **Internal**: Server-side problems (500 errors)
//! - **BadRequest**: Client sent invalid data (400 errors)
//! - **NotFound**: Requested resource doesn't exist (404 errors)
//! - **ConfigError**: Configuration problems (500 errors)
//! - **ValidationError**: Missing or invalid user input (400 errors)
//! - **NetworkError**: A remote generative-service call failed (502 errors)
//! - **DecodeError**: Malformed base64/JSON/audio payload (502 errors)
//! - **PermissionError**: Microphone access denied by the client (403 errors)
//!
//! Remote-call failures are caught at the call site, logged, and surfaced as a
//! single user-facing message. There is no retry/backoff policy anywhere -
//! every remote call is single-attempt.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (I/O failures, poisoned state, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules (e.g., empty topic)
    ValidationError(String),

    /// A call to the remote generation/grading service failed
    NetworkError(String),

    /// Malformed base64, JSON, or audio payload
    DecodeError(String),

    /// Microphone access was denied on the client side
    PermissionError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppError::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            AppError::PermissionError(msg) => write!(f, "Permission error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into the JSON error responses API clients receive.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
/// - NetworkError/DecodeError → 502 (Bad Gateway - the remote service failed us)
/// - PermissionError → 403 (Forbidden)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "network_error",
///     "message": "Failed to reach the generation service",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::NetworkError(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "network_error",
                msg.clone(),
            ),
            AppError::DecodeError(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "decode_error",
                msg.clone(),
            ),
            AppError::PermissionError(msg) => (
                actix_web::http::StatusCode::FORBIDDEN,
                "permission_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Malformed JSON is a decode failure in our taxonomy: it covers both client
/// payloads and, more commonly, structured responses from the remote
/// generation service that don't match the declared schema.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::DecodeError(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Any HTTP-level failure talking to the generative service is a NetworkError;
/// the client stays on its current screen and may retry.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkError(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::DecodeError(format!("Base64 decoding error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("Topic cannot be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: Topic cannot be empty");
    }

    #[test]
    fn test_json_error_becomes_decode_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AppError = parse_err.into();
        assert!(matches!(err, AppError::DecodeError(_)));
    }
}
