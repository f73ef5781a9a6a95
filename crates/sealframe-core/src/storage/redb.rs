//! Redb-backed durable store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Keys
//! are built from length-prefixed string components so that prefix scans
//! (all keys of a user, all signatures over a key) never match a longer
//! identifier that merely shares leading bytes.

use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use sealframe_crypto::InboundGroupSession;

use super::{CryptoStore, IndexClaim, StorageError};
use crate::ids::{
    CrossSigningUsage, EventId, RoomId, SenderKey, SessionId, SignatureRecord, SigningKey, UserId,
};

/// Table: cross_signing_keys
/// Key: [user][usage]
/// Value: public key string bytes
const CROSS_SIGNING_KEYS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("cross_signing_keys");

/// Table: signatures
/// Key: [signed_user][signed_key][signer_user][signer_key]
/// Value: raw signature bytes
const SIGNATURES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("signatures");

/// Table: group_sessions
/// Key: [room][sender_key][session_id]
/// Value: fixed-size inbound session encoding
const GROUP_SESSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("group_sessions");

/// Table: message_indices
/// Key: [sender_key][session_id] + index (4 bytes BE)
/// Value: CBOR-encoded IndexClaim
const MESSAGE_INDICES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("message_indices");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates all tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(CROSS_SIGNING_KEYS).map_err(io)?;
            let _ = txn.open_table(SIGNATURES).map_err(io)?;
            let _ = txn.open_table(GROUP_SESSIONS).map_err(io)?;
            let _ = txn.open_table(MESSAGE_INDICES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl CryptoStore for RedbStore {
    fn cross_signing_keys(
        &self,
        user: &UserId,
    ) -> Result<HashMap<CrossSigningUsage, SigningKey>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(CROSS_SIGNING_KEYS).map_err(io)?;

        let prefix = encode_key(&[user.as_str()]);
        let mut keys = HashMap::new();

        for result in table.range(prefix.as_slice()..).map_err(io)? {
            let (key, value) = result.map_err(io)?;
            let Some(rest) = key.value().strip_prefix(prefix.as_slice()) else {
                break;
            };

            let usage = decode_components::<1>(rest)
                .and_then(|[usage]| CrossSigningUsage::parse(usage))
                .ok_or_else(|| StorageError::Corrupt("cross-signing key entry".to_string()))?;
            keys.insert(usage, SigningKey::new(decode_str(value.value())?));
        }

        Ok(keys)
    }

    fn put_cross_signing_key(
        &self,
        user: &UserId,
        usage: CrossSigningUsage,
        key: &SigningKey,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(CROSS_SIGNING_KEYS).map_err(io)?;
            let db_key = encode_key(&[user.as_str(), usage.as_str()]);
            table.insert(db_key.as_slice(), key.as_str().as_bytes()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn is_key_signed_by(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SIGNATURES).map_err(io)?;

        let key = signature_key(signed_user, signed_key, signer_user, signer_key);
        Ok(table.get(key.as_slice()).map_err(io)?.is_some())
    }

    fn signatures_for_key_by(
        &self,
        key_owner: &UserId,
        key: &SigningKey,
        signer_user: &UserId,
    ) -> Result<HashMap<SigningKey, Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(SIGNATURES).map_err(io)?;

        let prefix = encode_key(&[key_owner.as_str(), key.as_str(), signer_user.as_str()]);
        let mut signatures = HashMap::new();

        for result in table.range(prefix.as_slice()..).map_err(io)? {
            let (db_key, value) = result.map_err(io)?;
            let Some(rest) = db_key.value().strip_prefix(prefix.as_slice()) else {
                break;
            };

            let [signer_key] = decode_components::<1>(rest)
                .ok_or_else(|| StorageError::Corrupt("signature entry".to_string()))?;
            signatures.insert(SigningKey::new(signer_key), value.value().to_vec());
        }

        Ok(signatures)
    }

    fn put_signature(&self, record: &SignatureRecord) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(SIGNATURES).map_err(io)?;
            let key = signature_key(
                &record.signed_user,
                &record.signed_key,
                &record.signer_user,
                &record.signer_key,
            );
            table.insert(key.as_slice(), record.signature.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn remove_signature(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let existed = {
            let mut table = txn.open_table(SIGNATURES).map_err(io)?;
            let key = signature_key(signed_user, signed_key, signer_user, signer_key);
            table.remove(key.as_slice()).map_err(io)?.is_some()
        };
        txn.commit().map_err(io)?;

        Ok(existed)
    }

    fn group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
    ) -> Result<Option<InboundGroupSession>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(GROUP_SESSIONS).map_err(io)?;

        let key = encode_key(&[room.as_str(), sender_key.as_str(), session_id.as_str()]);

        match table.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(InboundGroupSession::from_bytes(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
        session: &InboundGroupSession,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(GROUP_SESSIONS).map_err(io)?;
            let key = encode_key(&[room.as_str(), sender_key.as_str(), session_id.as_str()]);
            let bytes = session.to_bytes();
            table.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

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
        // Read and insert share one write transaction; Redb serializes writers.
        let txn = self.db.begin_write().map_err(io)?;
        let accepted = {
            let mut table = txn.open_table(MESSAGE_INDICES).map_err(io)?;

            let mut key = encode_key(&[sender_key.as_str(), session_id.as_str()]);
            key.extend_from_slice(&index.to_be_bytes());

            let existing = table
                .get(key.as_slice())
                .map_err(io)?
                .map(|value| decode_claim(value.value()))
                .transpose()?;

            match existing {
                Some(claim) => claim.matches(event_id, timestamp),
                None => {
                    let claim = IndexClaim { event_id: event_id.clone(), timestamp };
                    let mut bytes = Vec::new();
                    ciborium::into_writer(&claim, &mut bytes)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?;
                    table.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
                    true
                },
            }
        };
        txn.commit().map_err(io)?;

        Ok(accepted)
    }
}

fn io(err: impl fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn decode_claim(bytes: &[u8]) -> Result<IndexClaim, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_str(bytes: &[u8]) -> Result<&str, StorageError> {
    std::str::from_utf8(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn signature_key(
    signed_user: &UserId,
    signed_key: &SigningKey,
    signer_user: &UserId,
    signer_key: &SigningKey,
) -> Vec<u8> {
    encode_key(&[signed_user.as_str(), signed_key.as_str(), signer_user.as_str(), signer_key.as_str()])
}

/// Encode string components as `[len: 4 bytes BE][utf8 bytes]` each.
///
/// A complete encoding of N components is a prefix of every key that starts
/// with those same N components, and of no other key.
fn encode_key(components: &[&str]) -> Vec<u8> {
    let len = components.iter().map(|c| 4 + c.len()).sum();
    let mut key = Vec::with_capacity(len);
    for component in components {
        key.extend_from_slice(&(component.len() as u32).to_be_bytes());
        key.extend_from_slice(component.as_bytes());
    }
    key
}

/// Decode exactly `N` components, rejecting trailing bytes.
fn decode_components<const N: usize>(mut bytes: &[u8]) -> Option<[&str; N]> {
    let mut out = [""; N];
    for slot in &mut out {
        let (len, rest) = bytes.split_first_chunk::<4>()?;
        let len = u32::from_be_bytes(*len) as usize;
        if rest.len() < len {
            return None;
        }
        let (component, rest) = rest.split_at(len);
        *slot = std::str::from_utf8(component).ok()?;
        bytes = rest;
    }
    bytes.is_empty().then_some(out)
}
