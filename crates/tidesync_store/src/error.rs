//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A table file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The storage path is empty or contains forbidden segments.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    /// Another process holds the store directory lock.
    #[error("store directory is locked: {}", .0.display())]
    Locked(PathBuf),

    /// The record does not exist.
    #[error("record '{id}' not found in '{path}'")]
    NotFound {
        /// Storage path searched.
        path: String,
        /// Identifier that was not found.
        id: String,
    },

    /// A record with the same identifier already exists.
    #[error("record '{id}' already exists in '{path}'")]
    AlreadyExists {
        /// Storage path written to.
        path: String,
        /// Conflicting identifier.
        id: String,
    },

    /// The store refused the write.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
