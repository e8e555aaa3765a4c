//! Error types for record decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while turning raw payloads into records.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The record carries no usable identifier.
    #[error("record in '{entity}' has no identifier")]
    MissingIdentifier {
        /// Entity the record was decoded for.
        entity: String,
    },

    /// The `updated_at` field is missing or cannot be read as a timestamp.
    #[error("record '{id}' in '{entity}' has an invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Entity the record was decoded for.
        entity: String,
        /// Identifier of the offending record.
        id: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// The payload does not have the expected structure.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// JSON parsing or encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR parsing or encoding failed.
    #[error("CBOR error: {0}")]
    Cbor(String),
}

impl ProtocolError {
    pub(crate) fn invalid_timestamp(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTimestamp {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}
