//! Storage error types.
//!
//! Defines errors that can occur during store operations:
//! - `Io`: Underlying storage system errors
//! - `Serialization`: Failed to encode/decode a stored record
//! - `Corrupt`: A stored record decoded but violates its own invariants

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored data is inconsistent
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<sealframe_crypto::GroupSessionError> for StorageError {
    fn from(err: sealframe_crypto::GroupSessionError) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}
