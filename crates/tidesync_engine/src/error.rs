//! Error types for the sync engine.

use serde::Serialize;
use thiserror::Error;
use tidesync_protocol::ProtocolError;
use tidesync_store::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local store read or write failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Fetching from the remote server failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A record could not be reconciled (missing identifier, bad timestamp,
    /// wrong entity).
    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    /// The registry or the run request is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Another pass over the same entity is still running.
    #[error("entity '{0}' already has an active sync pass")]
    PassInProgress(String),
}

/// Coarse classification of a [`SyncError`], recorded in sync reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`SyncError::Storage`].
    Storage,
    /// See [`SyncError::Transport`].
    Transport,
    /// See [`SyncError::Reconciliation`].
    Reconciliation,
    /// See [`SyncError::Configuration`].
    Configuration,
    /// See [`SyncError::PassInProgress`].
    Busy,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::Reconciliation(_) => ErrorKind::Reconciliation,
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::PassInProgress(_) => ErrorKind::Busy,
        }
    }

    /// Returns true if running the sync again may succeed without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Storage(StoreError::Io(_)) => true,
            SyncError::PassInProgress(_) => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MissingIdentifier { .. } | ProtocolError::InvalidTimestamp { .. } => {
                SyncError::Reconciliation(err.to_string())
            }
            ProtocolError::Malformed(_) | ProtocolError::Json(_) | ProtocolError::Cbor(_) => {
                SyncError::transport_fatal(format!("unreadable payload: {}", err))
            }
        }
    }
}
