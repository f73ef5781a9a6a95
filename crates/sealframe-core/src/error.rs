//! Group decryption errors.
//!
//! Every failure of [`GroupDecryptor::decrypt_megolm_event`] is one of these
//! variants, so callers can pick a recovery per variant: request the session
//! again on [`DecryptionError::NoSessionFound`], drop the envelope on
//! [`DecryptionError::DuplicateMessageIndex`], surface the rest.
//!
//! [`GroupDecryptor::decrypt_megolm_event`]: crate::GroupDecryptor::decrypt_megolm_event

use sealframe_crypto::GroupSessionError;
use thiserror::Error;

use crate::{
    event::{ContentError, EventType},
    ids::{SenderKey, SessionId},
    storage::StorageError,
};

/// Errors from decrypting a group-encrypted room event
#[derive(Error, Debug)]
pub enum DecryptionError {
    /// Envelope is not an `m.room.encrypted` event with encrypted content
    #[error("incorrect content type {event_type} for group decryption")]
    IncorrectContentType {
        /// Envelope type as received
        event_type: EventType,
    },

    /// Encrypted with an algorithm this pipeline cannot decrypt
    #[error("unsupported encryption algorithm {algorithm}")]
    UnsupportedAlgorithm {
        /// Algorithm named in the content
        algorithm: String,
    },

    /// No group session stored for this sender and session ID
    #[error("no group session found for {session_id} from {sender_key}")]
    NoSessionFound {
        /// Sender identity key
        sender_key: SenderKey,
        /// Missing session
        session_id: SessionId,
    },

    /// Store failed while loading the group session
    #[error("failed to get group session: {0}")]
    SessionLookup(#[source] StorageError),

    /// Ciphertext could not be decoded, verified or decrypted
    #[error("failed to decrypt: {0}")]
    Decrypt(#[from] GroupSessionError),

    /// Store failed while persisting the advanced session
    #[error("failed to update group session: {0}")]
    SessionUpdate(#[source] StorageError),

    /// Store failed while checking the message index
    #[error("failed to check message index: {0}")]
    IndexValidation(#[source] StorageError),

    /// A different event already claimed this message index
    #[error("duplicate message index {message_index}")]
    DuplicateMessageIndex {
        /// Index claimed twice
        message_index: u32,
    },

    /// Plaintext is not a JSON `{type, content}` object
    #[error("failed to parse decrypted payload: {0}")]
    PayloadParse(#[source] serde_json::Error),

    /// Inner content of a recognized type is malformed
    #[error("failed to parse decrypted content: {0}")]
    ContentParse(#[source] ContentError),
}

impl DecryptionError {
    /// Whether re-requesting the group session could make this envelope
    /// decryptable.
    pub fn needs_new_session(&self) -> bool {
        match self {
            Self::NoSessionFound { .. } => true,
            Self::Decrypt(e) => !e.is_fatal(),
            _ => false,
        }
    }

    /// Whether the envelope was rejected as a replay.
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::DuplicateMessageIndex { .. })
    }
}
