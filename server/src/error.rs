use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Rejections surfaced by the messaging core to its callers.
///
/// Fanout failures are absent: a dead connection is evicted and logged,
/// never reported to whoever triggered the push. A write that could not be
/// made durable is not a rejection either; see `chat::service::Applied`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("you can only message friends")]
    NotFriends,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("message not found")]
    NotFound,
}

/// Errors raised by the durable repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("storage task failed: {0}")]
    Task(String),
}

impl MessagingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MessagingError::NotFriends => StatusCode::FORBIDDEN,
            MessagingError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            MessagingError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for MessagingError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}
