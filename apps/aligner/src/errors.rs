use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::CacheError;
use crate::llm_client::LlmError;
use crate::schema::{SchemaValidationError, TaskKind};

/// Failure taxonomy of the prompt/parse engine and the orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Neither backend answered. Fatal for the request.
    #[error("no inference backend reachable (tried: {0})")]
    BackendUnavailable(String),

    /// The repair budget ran out. Fatal for this task only.
    #[error("{task} response unparseable after {attempts} attempts: {last_error}")]
    UnparseableModelResponse {
        task: TaskKind,
        attempts: u32,
        last_error: SchemaValidationError,
    },

    /// Transport, HTTP status or timeout. Not retried by the engine.
    #[error("model backend error: {0}")]
    Backend(LlmError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<LlmError> for EngineError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Unavailable { tried } => EngineError::BackendUnavailable(tried),
            other => EngineError::Backend(other),
        }
    }
}

impl EngineError {
    /// Stable label used in failed analysis sections.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BackendUnavailable(_) => "backend_unavailable",
            EngineError::UnparseableModelResponse { .. } => "unparseable_response",
            EngineError::Backend(LlmError::Timeout { .. }) => "backend_timeout",
            EngineError::Backend(_) => "backend_error",
            EngineError::Cache(_) => "cache_error",
            EngineError::Serialization(_) => "serialization_error",
            EngineError::InvalidInput(_) => "invalid_input",
        }
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Engine(EngineError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Engine(EngineError::BackendUnavailable(tried)) => {
                tracing::error!("No inference backend reachable: {tried}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    "No language model backend is reachable".to_string(),
                )
            }
            AppError::Engine(e @ EngineError::UnparseableModelResponse { .. }) => {
                tracing::error!("{e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UNPARSEABLE_MODEL_RESPONSE",
                    e.to_string(),
                )
            }
            AppError::Engine(EngineError::Backend(LlmError::Timeout { secs })) => (
                StatusCode::GATEWAY_TIMEOUT,
                "LLM_TIMEOUT",
                format!("The language model did not answer within {secs}s"),
            ),
            AppError::Engine(EngineError::Backend(e)) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Engine(e) => {
                tracing::error!("Engine error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_llm_error_becomes_backend_unavailable() {
        let err: EngineError = LlmError::Unavailable {
            tried: "local:llama3.2:3b".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::BackendUnavailable(_)));
        assert_eq!(err.kind(), "backend_unavailable");
    }

    #[test]
    fn test_timeout_keeps_its_own_kind() {
        let err: EngineError = LlmError::Timeout { secs: 120 }.into();
        assert_eq!(err.kind(), "backend_timeout");
    }

    #[test]
    fn test_status_codes() {
        let unavailable = AppError::Engine(EngineError::BackendUnavailable("x".into())).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid = AppError::Engine(EngineError::InvalidInput("no facts".into())).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let unparseable = AppError::Engine(EngineError::UnparseableModelResponse {
            task: TaskKind::KeywordGap,
            attempts: 3,
            last_error: SchemaValidationError::new("gaps", "required field is missing"),
        })
        .into_response();
        assert_eq!(unparseable.status(), StatusCode::BAD_GATEWAY);
    }
}
