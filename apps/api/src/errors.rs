use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// A built feature vector that does not conform to the schema it targets.
///
/// Carries both shapes so the caller (and the logs) can see exactly how the
/// vector diverged. Never auto-corrected by slicing or padding.
#[derive(Debug, Clone, Serialize, Error)]
#[error(
    "vector does not match schema '{}' (expected {} slots, got {}): {}",
    .schema_version,
    .expected_len,
    .actual_len,
    .problems.join("; ")
)]
pub struct SchemaMismatch {
    pub schema_version: String,
    pub expected_len: usize,
    pub actual_len: usize,
    pub expected_names: Vec<String>,
    pub actual_names: Vec<String>,
    pub problems: Vec<String>,
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or unreadable profile input. Never retried.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaMismatch),

    /// The scorer answered with something unusable, or rejected the request outright.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Registry and deployed model disagree, or a schema cannot be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, shared by HTTP bodies and batch entries.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Data(_) => "DATA_ERROR",
            AppError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Data(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SchemaMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {msg}");
                msg.clone()
            }
            AppError::ExternalService(msg) => {
                tracing::error!("Scorer error: {msg}");
                msg.clone()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal server error occurred".to_string()
            }
            AppError::SchemaMismatch(mismatch) => {
                tracing::error!("Schema mismatch: {mismatch}");
                mismatch.to_string()
            }
            AppError::Data(msg) | AppError::Validation(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
        };

        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        if let AppError::SchemaMismatch(mismatch) = &self {
            error["details"] = json!(mismatch);
        }

        (self.status(), Json(json!({ "error": error }))).into_response()
    }
}
