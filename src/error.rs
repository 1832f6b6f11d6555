//! Error types for Noor

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using Noor's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Noor
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: length mismatches, non-positive dimensions, null payload values
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backing service (vector index, Redis, database) could not be reached
    #[error("Store connection error: {0}")]
    StoreConnection(String),

    /// Collection or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create target (collection, record) is already there
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Embedding model failed or input was unusable
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A network call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable discriminant of [`Error`], used in error payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StoreConnection,
    NotFound,
    AlreadyExists,
    Embedding,
    Timeout,
    Config,
    Internal,
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreConnection(_) | Error::Timeout(_) => true,
            Error::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound(_) | Error::AlreadyExists(_)
        )
    }

    /// Coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::StoreConnection(_) | Error::Http(_) => ErrorKind::StoreConnection,
            Error::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            Error::Database(_) => ErrorKind::StoreConnection,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Embedding(_) => ErrorKind::Embedding,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::StoreConnection(format!("redis: {}", err))
    }
}

impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        use qdrant_client::QdrantError;

        // gRPC status codes: 3 invalid argument, 4 deadline exceeded,
        // 5 not found, 6 already exists
        match err {
            QdrantError::ResponseError { status } => match status.code() as i32 {
                5 => Error::NotFound(status.message().to_string()),
                6 => Error::AlreadyExists(status.message().to_string()),
                // qdrant reports a duplicate collection as a bad argument
                3 if status.message().contains("already exists") => {
                    Error::AlreadyExists(status.message().to_string())
                }
                3 => Error::Validation(status.message().to_string()),
                4 => Error::Timeout(status.message().to_string()),
                _ => Error::StoreConnection(format!("qdrant: {}", status.message())),
            },
            other => Error::StoreConnection(format!("qdrant: {}", other)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(err.to_string())
    }
}
