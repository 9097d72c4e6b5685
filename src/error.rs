//! # Error Handling
//!
//! Custom error types for the service and how they map onto HTTP responses.
//!
//! ## Error Categories:
//! - **Caller errors** (`BadRequest`, `ValidationError`, `NotFound`, `Conflict`,
//!   `UnsupportedModel`): surfaced synchronously, never retried.
//! - **Pipeline errors** (`EngineLoad`, `Transcription`): produced inside the
//!   job workers and recorded on the failed job. They only reach an HTTP
//!   response through the administrative model endpoints.
//! - **Server errors** (`Internal`, `ConfigError`): everything else.
//!
//! ## Key Rust Concepts:
//! - **enum with data**: every variant carries the human-readable message
//! - **From trait**: lets `?` convert library errors into `AppError`
//! - **ResponseError trait**: actix-web turns the error into a JSON response

use crate::transcription::engine::EngineError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::NotFound(format!("Audio source {} not found", id)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Internal server errors (storage failures, task failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Referenced audio, job, result or model does not exist
    NotFound(String),

    /// The request conflicts with the current state of a record
    /// (duplicate model name, transition out of a terminal job state)
    Conflict(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// The requested model name is not known to any registry
    UnsupportedModel(String),

    /// A recognition engine could not be constructed
    EngineLoad(String),

    /// A recognition engine failed while transcribing
    Transcription(String),
}

impl AppError {
    /// Machine-readable error type used in JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::UnsupportedModel(_) => "unsupported_model",
            AppError::EngineLoad(_) => "engine_load_error",
            AppError::Transcription(_) => "transcription_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::UnsupportedModel(msg)
            | AppError::EngineLoad(msg)
            | AppError::Transcription(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::UnsupportedModel(msg) => write!(f, "Unsupported model: {}", msg),
            AppError::EngineLoad(msg) => write!(f, "Engine load error: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "unsupported_model",
///     "message": "Model 'paraformer' is not registered",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::ValidationError(_)
            | AppError::UnsupportedModel(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_)
            | AppError::ConfigError(_)
            | AppError::EngineLoad(_)
            | AppError::Transcription(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Anything bubbling up through `anyhow` is treated as an internal error.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always caused by the client.
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

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(format!("Database error: {}", err))
    }
}

/// Engine failures keep their construction-versus-execution distinction.
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Load(msg) => AppError::EngineLoad(msg),
            other => AppError::Transcription(other.to_string()),
        }
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
