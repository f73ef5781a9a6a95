//! Key and session store abstraction
//!
//! Trait-based abstraction over cross-signing keys, signature edges, group
//! sessions and the message-index ledger. The trait is synchronous (no
//! async); every method is one round trip.

mod chaotic;
mod error;
mod memory;
mod redb;

use std::collections::HashMap;

pub use chaotic::ChaoticStore;
pub use error::StorageError;
pub use memory::MemoryStore;
use sealframe_crypto::InboundGroupSession;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStore;
use crate::ids::{
    CrossSigningUsage, EventId, RoomId, SenderKey, SessionId, SignatureRecord, SigningKey, UserId,
};

/// First claim recorded against a message index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexClaim {
    /// Event that first decrypted at this index
    pub event_id: EventId,
    /// Its server timestamp (milliseconds)
    pub timestamp: u64,
}

impl IndexClaim {
    /// Whether a new claim is the same event seen again.
    pub fn matches(&self, event_id: &EventId, timestamp: u64) -> bool {
        self.event_id == *event_id && self.timestamp == timestamp
    }
}

/// Store for cross-signing keys, signatures, group sessions and index claims
///
/// Must be Clone (shared by resolver and decryptor), Send + Sync
/// (thread-safe), and synchronous. Implementations share internal state, so
/// clones access the same underlying store.
///
/// # Consistency
///
/// Each read returns a consistent snapshot; a signature set is never
/// observed half-written. [`validate_message_index`] is a single atomic
/// check-and-record.
///
/// [`validate_message_index`]: CryptoStore::validate_message_index
pub trait CryptoStore: Clone + Send + Sync + 'static {
    /// Cross-signing public keys published by `user`, by usage.
    ///
    /// Returns an empty map for unknown users.
    fn cross_signing_keys(
        &self,
        user: &UserId,
    ) -> Result<HashMap<CrossSigningUsage, SigningKey>, StorageError>;

    /// Record (or replace) one of `user`'s cross-signing keys.
    fn put_cross_signing_key(
        &self,
        user: &UserId,
        usage: CrossSigningUsage,
        key: &SigningKey,
    ) -> Result<(), StorageError>;

    /// Whether `signer_key` (owned by `signer_user`) signed `signed_key`
    /// (owned by `signed_user`).
    fn is_key_signed_by(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError>;

    /// All signatures `signer_user` made over `key`, by signing key.
    fn signatures_for_key_by(
        &self,
        key_owner: &UserId,
        key: &SigningKey,
        signer_user: &UserId,
    ) -> Result<HashMap<SigningKey, Vec<u8>>, StorageError>;

    /// Record a signature edge, replacing an existing one.
    fn put_signature(&self, record: &SignatureRecord) -> Result<(), StorageError>;

    /// Delete a signature edge. Returns whether it existed.
    fn remove_signature(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError>;

    /// Load a group session.
    ///
    /// Returns `None` if no session exists for this key.
    fn group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
    ) -> Result<Option<InboundGroupSession>, StorageError>;

    /// Store a group session, overwriting any existing state.
    fn put_group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
        session: &InboundGroupSession,
    ) -> Result<(), StorageError>;

    /// Check a decryption against the index ledger and record it.
    ///
    /// Atomically: if no claim exists for `(sender_key, session_id, index)`,
    /// records `(event_id, timestamp)` and returns true. Otherwise returns
    /// whether the existing claim is this same event.
    fn validate_message_index(
        &self,
        sender_key: &SenderKey,
        session_id: &SessionId,
        event_id: &EventId,
        index: u32,
        timestamp: u64,
    ) -> Result<bool, StorageError>;
}
