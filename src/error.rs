//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **AppError**: failures of the HTTP surface (config endpoints, validation).
//!   These turn into JSON error responses through actix's `ResponseError`.
//! - **StreamError**: failures of a streaming recognition stream (not configured,
//!   bad options, bad audio, remote failure). These travel over the WebSocket as
//!   `error` events and never become HTTP responses directly.
//!
//! Recognition transport failures have their own type, `RecognitionError`, in the
//! recognition module; `StreamError::Remote` wraps it when it needs to surface.
//!
//! ## Rust Concepts Used:
//!
//! ### Enums as error types
//! - **Variants**: One per failure category, each carrying a message
//! - **Pattern matching**: `match` picks the HTTP status / event text per variant
//!
//! ### Conversion traits
//! - **From**: Lets `?` convert library errors (anyhow, serde_json, config, toml)
//! - **Display**: Human-readable text used in logs and error payloads

use crate::recognition::RecognitionError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Unexpected server-side failures (500)
/// - **BadRequest**: Malformed client input (400)
/// - **ConfigError**: Configuration could not be loaded or rendered (500)
/// - **ValidationError**: Well-formed input that breaks a rule (400)
/// - **Unavailable**: No capacity left to serve the request (503)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    ConfigError(String),
    ValidationError(String),
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// HTTP mapping for `AppError`.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "session_time_limit_ms must be greater than 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
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

/// JSON problems are almost always the client's fault, hence 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::ConfigError(format!("TOML rendering error: {}", err))
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

/// Errors produced while setting up or running a recognition stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// `run` was called before a successful `configure`
    NotConfigured,

    /// Streaming options failed validation
    InvalidConfig(String),

    /// A client audio chunk was rejected
    InvalidAudio(String),

    /// The remote recognizer failed
    Remote(RecognitionError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::NotConfigured => {
                write!(f, "Configuration not set. Send a config message first.")
            }
            StreamError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            StreamError::InvalidAudio(msg) => write!(f, "Invalid audio: {}", msg),
            StreamError::Remote(err) => write!(f, "Recognition error: {}", err),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<RecognitionError> for StreamError {
    fn from(err: RecognitionError) -> Self {
        StreamError::Remote(err)
    }
}

/// Bad options or audio are the client's fault; recognizer failures are ours.
impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidConfig(msg) | StreamError::InvalidAudio(msg) => {
                AppError::ValidationError(msg)
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
