//! Error types for FileCan

use thiserror::Error;

/// Result type alias for FileCan operations
pub type Result<T> = std::result::Result<T, FileCanError>;

/// FileCan error types
#[derive(Error, Debug)]
pub enum FileCanError {
    /// Object, collection or area is absent on a read-style operation
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied object id is already taken in the collection
    #[error("Duplicate id '{id}' in {area}/{collection}")]
    DuplicateId {
        area: String,
        collection: String,
        id: String,
    },

    /// Area, collection or object id is unsafe or malformed
    #[error("Invalid {kind} identifier '{value}': {reason}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// Invalid argument (negative skip/take and the like)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Wrong or missing password, or tampered ciphertext
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Codec could not encode the value
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Codec could not decode the stored bytes into the requested type
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Keyword index disagrees with the stored objects
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Malformed object or snapshot file
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FileCanError {
    /// Check if error means the addressed item does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileCanError::NotFound(_))
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, FileCanError::Io(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FileCanError::Corruption(_)
                | FileCanError::ChecksumMismatch { .. }
                | FileCanError::IndexCorrupt(_)
        )
    }
}
