#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, Mutex, MutexGuard},
};

use sealframe_crypto::InboundGroupSession;

use super::{CryptoStore, IndexClaim, StorageError};
use crate::ids::{
    CrossSigningUsage, EventId, RoomId, SenderKey, SessionId, SignatureRecord, SigningKey, UserId,
};

type KeyRef = (UserId, SigningKey);
type SessionKey = (RoomId, SenderKey, SessionId);
type LedgerKey = (SenderKey, SessionId, u32);

/// In-memory store for testing and embedding
///
/// All state sits behind one `Arc<Mutex<>>`, so clones share data and every
/// operation (including index validation) is atomic with respect to every
/// other. A poisoned lock surfaces as `StorageError::Io`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Cross-signing keys per user
    cross_signing: HashMap<UserId, HashMap<CrossSigningUsage, SigningKey>>,

    /// Signature edges: signed (user, key) -> signer (user, key) -> signature
    signatures: HashMap<KeyRef, HashMap<KeyRef, Vec<u8>>>,

    /// Inbound group sessions
    sessions: HashMap<SessionKey, InboundGroupSession>,

    /// Message-index ledger
    claims: HashMap<LedgerKey, IndexClaim>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored group sessions.
    pub fn session_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.sessions.len())
    }

    /// Number of recorded message-index claims.
    pub fn claim_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.claims.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))
    }
}

impl CryptoStore for MemoryStore {
    fn cross_signing_keys(
        &self,
        user: &UserId,
    ) -> Result<HashMap<CrossSigningUsage, SigningKey>, StorageError> {
        Ok(self.lock()?.cross_signing.get(user).cloned().unwrap_or_default())
    }

    fn put_cross_signing_key(
        &self,
        user: &UserId,
        usage: CrossSigningUsage,
        key: &SigningKey,
    ) -> Result<(), StorageError> {
        self.lock()?.cross_signing.entry(user.clone()).or_default().insert(usage, key.clone());
        Ok(())
    }

    fn is_key_signed_by(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        let inner = self.lock()?;
        let signed = (signed_user.clone(), signed_key.clone());
        let signer = (signer_user.clone(), signer_key.clone());

        Ok(inner.signatures.get(&signed).is_some_and(|signers| signers.contains_key(&signer)))
    }

    fn signatures_for_key_by(
        &self,
        key_owner: &UserId,
        key: &SigningKey,
        signer_user: &UserId,
    ) -> Result<HashMap<SigningKey, Vec<u8>>, StorageError> {
        let inner = self.lock()?;
        let signed = (key_owner.clone(), key.clone());

        Ok(inner
            .signatures
            .get(&signed)
            .map(|signers| {
                signers
                    .iter()
                    .filter(|((user, _), _)| user == signer_user)
                    .map(|((_, signer_key), signature)| (signer_key.clone(), signature.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_signature(&self, record: &SignatureRecord) -> Result<(), StorageError> {
        self.lock()?
            .signatures
            .entry((record.signed_user.clone(), record.signed_key.clone()))
            .or_default()
            .insert((record.signer_user.clone(), record.signer_key.clone()), record.signature.clone());
        Ok(())
    }

    fn remove_signature(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        let signed = (signed_user.clone(), signed_key.clone());
        let signer = (signer_user.clone(), signer_key.clone());

        Ok(inner
            .signatures
            .get_mut(&signed)
            .is_some_and(|signers| signers.remove(&signer).is_some()))
    }

    fn group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
    ) -> Result<Option<InboundGroupSession>, StorageError> {
        let key = (room.clone(), sender_key.clone(), session_id.clone());
        Ok(self.lock()?.sessions.get(&key).cloned())
    }

    fn put_group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
        session: &InboundGroupSession,
    ) -> Result<(), StorageError> {
        let key = (room.clone(), sender_key.clone(), session_id.clone());
        self.lock()?.sessions.insert(key, session.clone());
        Ok(())
    }

    fn validate_message_index(
        &self,
        sender_key: &SenderKey,
        session_id: &SessionId,
        event_id: &EventId,
        index: u32,
        timestamp: u64,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;

        match inner.claims.entry((sender_key.clone(), session_id.clone(), index)) {
            Entry::Occupied(existing) => Ok(existing.get().matches(event_id, timestamp)),
            Entry::Vacant(slot) => {
                slot.insert(IndexClaim { event_id: event_id.clone(), timestamp });
                Ok(true)
            },
        }
    }
}
