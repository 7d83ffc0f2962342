//! Closed-set pipeline error type (spec §7): one `thiserror` variant family
//! per error kind, with an `IntoResponse` impl and a `stage()`/`error_code()`
//! accessor pair the top orchestrator uses to populate `error_details`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeParsingKind {
    Type,
    Format,
    Value,
    Logic,
}

impl TimeParsingKind {
    pub fn code(&self) -> &'static str {
        match self {
            TimeParsingKind::Type => "TYPE_ERROR",
            TimeParsingKind::Format => "FORMAT_ERROR",
            TimeParsingKind::Value => "VALUE_ERROR",
            TimeParsingKind::Logic => "LOGIC_ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    Client,
    Server,
    Timeout,
    Parse,
}

impl LlmErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            LlmErrorKind::Client => "CLIENT",
            LlmErrorKind::Server => "SERVER",
            LlmErrorKind::Timeout => "TIMEOUT",
            LlmErrorKind::Parse => "PARSE",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {message}")]
    Validation { message: String, details: Option<Value> },

    #[error("time parsing error ({kind:?}): {message}")]
    TimeParsing { kind: TimeParsingKind, message: String, input: String, hint: String },

    #[error("peg processing error at step '{step}': {message}")]
    PegProcessing { step: String, message: String, details: Option<Value> },

    #[error("database error: {message}")]
    Database { message: String, query_preview: String, param_keys: Vec<String> },

    #[error("llm error ({kind:?}): {message}")]
    Llm { kind: LlmErrorKind, message: String, is_retryable: bool, endpoints: Vec<String> },

    #[error("llm analysis error: {message}")]
    LlmAnalysis { message: String, prompt_preview: String },

    #[error("backend schema error: {message}")]
    BackendSchema { message: String },

    #[error("backend http error: {message}")]
    BackendHttp { message: String, status: Option<u16> },

    #[error("backend timeout error: {message}")]
    BackendTimeout { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into(), details: None }
    }

    pub fn peg_processing(step: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::PegProcessing { step: step.into(), message: message.into(), details: None }
    }

    /// The stable error code surfaced in `error_details.code` (spec §6.2/§7).
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::TimeParsing { kind, .. } => kind.code(),
            AppError::PegProcessing { .. } => "PEG_PROCESSING_ERROR",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::Llm { kind, .. } => match kind {
                LlmErrorKind::Client => "LLM_ERROR_CLIENT",
                LlmErrorKind::Server => "LLM_ERROR_SERVER",
                LlmErrorKind::Timeout => "LLM_ERROR_TIMEOUT",
                LlmErrorKind::Parse => "LLM_ERROR_PARSE",
            },
            AppError::BackendSchema { .. } => "BACKEND_SCHEMA_ERROR",
            AppError::BackendHttp { .. } => "BACKEND_HTTP_ERROR",
            AppError::BackendTimeout { .. } => "BACKEND_TIMEOUT_ERROR",
            AppError::LlmAnalysis { .. } => "LLM_ANALYSIS_ERROR",
            AppError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// The pipeline stage namespace this error belongs to (spec §4.11).
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "request_validation",
            AppError::TimeParsing { .. } => "time_parsing",
            AppError::PegProcessing { .. } => "peg_processing",
            AppError::Database { .. } => "peg_processing",
            AppError::Llm { .. } | AppError::LlmAnalysis { .. } => "llm_analysis",
            AppError::BackendSchema { .. } | AppError::BackendHttp { .. } | AppError::BackendTimeout { .. } => {
                "deterministic_judgement"
            },
            AppError::Other(_) => "result_assembly",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Llm { is_retryable, .. } => *is_retryable,
            AppError::BackendHttp { status, .. } => matches!(status, Some(s) if *s >= 500),
            _ => false,
        }
    }

    /// Structured details for `error_details.details`, with no secrets and
    /// no raw query literal values (spec §7).
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Validation { details, .. } => details.clone(),
            AppError::TimeParsing { input, hint, .. } => {
                Some(serde_json::json!({ "input": input, "hint": hint }))
            },
            AppError::PegProcessing { details, .. } => details.clone(),
            AppError::Database { query_preview, param_keys, .. } => {
                Some(serde_json::json!({ "query_preview": query_preview, "param_keys": param_keys }))
            },
            AppError::Llm { endpoints, .. } => Some(serde_json::json!({ "endpoints": endpoints })),
            AppError::LlmAnalysis { prompt_preview, .. } => {
                Some(serde_json::json!({ "prompt_preview": prompt_preview }))
            },
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::TimeParsing { .. } => StatusCode::BAD_REQUEST,
            AppError::PegProcessing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Llm { kind, .. } => match kind {
                LlmErrorKind::Client => StatusCode::BAD_GATEWAY,
                LlmErrorKind::Server => StatusCode::BAD_GATEWAY,
                LlmErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                LlmErrorKind::Parse => StatusCode::BAD_GATEWAY,
            },
            AppError::BackendSchema { .. } => StatusCode::BAD_GATEWAY,
            AppError::BackendHttp { .. } => StatusCode::BAD_GATEWAY,
            AppError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::LlmAnalysis { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    stage: &'static str,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            stage: self.stage(),
            code: self.error_code(),
            message: self.to_string(),
            details: self.details(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database { message: err.to_string(), query_preview: String::new(), param_keys: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_matches_time_parsing_kind() {
        let e = AppError::TimeParsing {
            kind: TimeParsingKind::Logic,
            message: "start >= end".to_string(),
            input: "x".to_string(),
            hint: "h".to_string(),
        };
        assert_eq!(e.error_code(), "LOGIC_ERROR");
        assert_eq!(e.stage(), "time_parsing");
    }

    #[test]
    fn llm_error_retryability_is_carried() {
        let e = AppError::Llm {
            kind: LlmErrorKind::Server,
            message: "503".to_string(),
            is_retryable: true,
            endpoints: vec!["http://a".to_string()],
        };
        assert!(e.is_retryable());
    }
}
