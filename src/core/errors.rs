use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

pub const MSG_EMPTY_QUESTION: &str = "Вопрос не может быть пустым.";
pub const MSG_NOT_READY: &str =
    "Извините, система не готова к обработке запросов. Пожалуйста, проверьте логи.";
pub const MSG_NOTHING_FOUND: &str = "Извините, не удалось найти информацию по вашему запросу.";
pub const MSG_RETRIEVAL_FAILED: &str =
    "Извините, произошла ошибка при поиске информации. Пожалуйста, попробуйте позже.";
pub const MSG_CONTEXT_EMPTY: &str = "Извините, не удалось обработать найденную информацию.";
pub const MSG_CONTEXT_FAILED: &str =
    "Извините, произошла ошибка при обработке информации. Пожалуйста, попробуйте позже.";
pub const MSG_EMPTY_GENERATION: &str =
    "Извините, не удалось сгенерировать ответ. Пожалуйста, попробуйте переформулировать вопрос.";
pub const MSG_GENERATION_FAILED: &str =
    "Извините, произошла ошибка при генерации ответа. Пожалуйста, попробуйте позже.";
pub const MSG_CRITICAL: &str =
    "Извините, произошла критическая ошибка. Пожалуйста, проверьте логи и попробуйте позже.";

/// Errors raised by the retrieval and answering pipeline.
///
/// Only `EmptyCorpus` and `IndexBuild` are meant to abort startup; every
/// other variant is converted into a user-facing sentence by the orchestrator.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,
    #[error("index build failed: {0}")]
    IndexBuild(String),
    #[error("index has not been built yet")]
    IndexNotReady,
    #[error("{0} received no input")]
    EmptyInput(&'static str),
    #[error("generator returned an empty completion")]
    EmptyGeneration,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("relevance scoring failed: {0}")]
    Scoring(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("critical pipeline error: {0}")]
    Critical(String),
}

impl RagError {
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        RagError::Transport(err.to_string())
    }

    /// Transient failures are the only ones worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Transport(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            RagError::EmptyQuestion => MSG_EMPTY_QUESTION,
            RagError::IndexNotReady | RagError::EmptyCorpus => MSG_NOT_READY,
            RagError::EmptyInput(_) => MSG_CONTEXT_EMPTY,
            RagError::EmptyGeneration => MSG_EMPTY_GENERATION,
            RagError::Generation(_) | RagError::Transport(_) => MSG_GENERATION_FAILED,
            RagError::Embedding(_) => MSG_RETRIEVAL_FAILED,
            RagError::IndexBuild(_)
            | RagError::Scoring(_)
            | RagError::Config(_)
            | RagError::Critical(_) => MSG_CRITICAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
