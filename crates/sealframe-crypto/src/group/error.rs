//! Error types for group session operations

use thiserror::Error;

/// Errors from group ratchet and group session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupSessionError {
    /// Wire bytes are too short or structurally invalid
    #[error("invalid group message: {reason}")]
    InvalidMessage {
        /// What was wrong with the message
        reason: String,
    },

    /// Message was produced by an unknown wire format version
    #[error("unsupported group message version {0}")]
    UnsupportedVersion(u8),

    /// Ed25519 signature over the message did not verify
    #[error("group message signature verification failed")]
    BadSignature,

    /// Message index is older than the earliest ratchet this session holds
    #[error("unknown message index {requested}, first known index is {first_known}")]
    UnknownMessageIndex {
        /// Earliest index this session can decrypt
        first_known: u32,
        /// Index carried by the message
        requested: u32,
    },

    /// Ratchet has already moved past the requested index
    #[error("ratchet is past index {requested}: at generation {current}")]
    RatchetBehind {
        /// Current ratchet generation
        current: u32,
        /// Requested generation
        requested: u32,
    },

    /// Requested index is further ahead of the ratchet than a single skip allows
    #[error("index {requested} is too far ahead of generation {current} (max skip {max_skip})")]
    SkipTooLarge {
        /// Current ratchet generation
        current: u32,
        /// Requested generation
        requested: u32,
        /// Largest permitted skip
        max_skip: u32,
    },

    /// AEAD decryption failed (authentication tag mismatch)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Ratchet generation would overflow
    #[error("ratchet generation overflow at {current}")]
    GenerationOverflow {
        /// Current generation when overflow was detected
        current: u32,
    },

    /// Persisted session bytes could not be decoded
    #[error("invalid session bytes: {reason}")]
    InvalidSessionBytes {
        /// What was wrong with the encoding
        reason: String,
    },
}

impl GroupSessionError {
    /// Returns true if this error indicates tampering or corruption.
    ///
    /// Non-fatal errors mean the local ratchet state cannot serve the
    /// message, which a fresh session export may fix.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidMessage { .. }
            | Self::UnsupportedVersion(_)
            | Self::BadSignature
            | Self::DecryptionFailed { .. }
            | Self::GenerationOverflow { .. }
            | Self::InvalidSessionBytes { .. } => true,

            Self::UnknownMessageIndex { .. }
            | Self::RatchetBehind { .. }
            | Self::SkipTooLarge { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_signature_is_fatal() {
        assert!(GroupSessionError::BadSignature.is_fatal());
    }

    #[test]
    fn unknown_index_is_not_fatal() {
        let err = GroupSessionError::UnknownMessageIndex { first_known: 10, requested: 3 };
        assert!(!err.is_fatal());
    }

    #[test]
    fn error_display() {
        let behind = GroupSessionError::RatchetBehind { current: 10, requested: 3 };
        assert_eq!(behind.to_string(), "ratchet is past index 3: at generation 10");

        let ahead =
            GroupSessionError::SkipTooLarge { current: 10, requested: 20_011, max_skip: 10_000 };
        assert_eq!(
            ahead.to_string(),
            "index 20011 is too far ahead of generation 10 (max skip 10000)"
        );
    }
}
