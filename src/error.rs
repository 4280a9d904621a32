use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Input bytes are not a readable spreadsheet container.
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
    /// Container opened but an internal structural read failed.
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Embedding error: {0}")]
    Embedding(String),
    #[error("Vector store error: {0}")]
    VectorStore(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Http(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("worker task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidFormat(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ParseFailure(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Http(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Embedding(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::VectorStore(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Llm(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
