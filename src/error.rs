// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{OptionId, PollId};

/// Malformed tally input. Fatal to the computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TallyError {
    #[error("poll has no options")]
    NoOptions,

    #[error("option {0} appears more than once")]
    DuplicateOption(OptionId),

    #[error("option {option} has negative vote count {count}")]
    NegativeCount { option: OptionId, count: i64 },
}

/// Why the vote writer refused or failed a write. Every variant is
/// recoverable and triggers a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
    #[error("viewer has already voted on this poll")]
    Duplicate,

    #[error("vote write timed out")]
    Timeout,

    #[error("vote rejected: {0}")]
    Rejected(String),

    #[error("store unreachable: {0}")]
    Network(String),
}

impl WriteFailure {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("poll {0} not found")]
    NotFound(PollId),

    #[error("invalid poll: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid viewer identity")]
    Unauthorized,

    #[error("not allowed to manage this poll")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Invalid(message) => AppError::BadRequest(message),
            StoreError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<TallyError> for AppError {
    fn from(err: TallyError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
