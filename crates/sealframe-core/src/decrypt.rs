//! Group-decryption pipeline.
//!
//! # Steps
//!
//! 1. Take the encrypted content out of the envelope.
//! 2. Under the session's lock, load the inbound session, decrypt, and
//!    persist the advanced ratchet.
//! 3. Claim the message index in the store's ledger. A different event
//!    already holding the index is a replay.
//! 4. Parse the plaintext as `{type, content}`. Unsupported inner types
//!    pass through with raw content.
//! 5. Rebuild the event from the inner type and content plus the outer
//!    envelope's sender, timestamp, IDs and unsigned section.
//!
//! Routing metadata inside the plaintext is ignored. Only the outer
//! envelope decides who sent what where.

use std::sync::Arc;

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use sealframe_crypto::{DecryptedGroupMessage, GroupSessionError};
use serde::Deserialize;

use crate::{
    error::DecryptionError,
    event::{Content, EncryptedContent, Event, EventType, MEGOLM_ALGORITHM},
    ids::{RoomId, SenderKey, SessionId},
    locks::SessionLocks,
    storage::CryptoStore,
    wedge::{MissingSession, TracingWedgeCheck, WedgeCheck},
};

/// Ciphertext is unpadded base64 on the wire; padded input is accepted too.
const CIPHERTEXT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Default session-lock table size before idle locks are pruned.
pub const DEFAULT_LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Decrypted plaintext shape.
#[derive(Deserialize)]
struct MegolmPayload {
    #[serde(rename = "type")]
    event_type: EventType,
    content: Content,
}

/// Decrypts group-encrypted room events with replay protection.
pub struct GroupDecryptor<S: CryptoStore> {
    store: S,
    locks: SessionLocks,
    wedge: Arc<dyn WedgeCheck>,
}

impl<S: CryptoStore> GroupDecryptor<S> {
    /// Decryptor that logs missing sessions.
    pub fn new(store: S) -> Self {
        Self::with_parts(store, Arc::new(TracingWedgeCheck), DEFAULT_LOCK_PRUNE_THRESHOLD)
    }

    /// Decryptor with an explicit wedge hook and lock-table threshold.
    pub fn with_parts(store: S, wedge: Arc<dyn WedgeCheck>, lock_prune_threshold: usize) -> Self {
        Self { store, locks: SessionLocks::new(lock_prune_threshold), wedge }
    }

    /// Replace the wedge hook.
    pub fn set_wedge_check(&mut self, wedge: Arc<dyn WedgeCheck>) {
        self.wedge = wedge;
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decrypt an `m.room.encrypted` event.
    ///
    /// On success the message index is recorded against this event, so a
    /// retry of the same event succeeds and any other event carrying the
    /// same index fails with [`DecryptionError::DuplicateMessageIndex`].
    pub fn decrypt_megolm_event(&self, event: &Event) -> Result<Event, DecryptionError> {
        let content = encrypted_content(event)?;

        if content.algorithm != MEGOLM_ALGORITHM {
            return Err(DecryptionError::UnsupportedAlgorithm { algorithm: content.algorithm });
        }

        let ciphertext = CIPHERTEXT_ENGINE.decode(&content.ciphertext).map_err(|e| {
            DecryptionError::Decrypt(GroupSessionError::InvalidMessage {
                reason: format!("ciphertext is not base64: {e}"),
            })
        })?;

        let decrypted = self.decrypt_with_session(
            event,
            &event.room_id,
            &content.sender_key,
            &content.session_id,
            &ciphertext,
        )?;
        let message_index = decrypted.message_index;

        let accepted = self
            .store
            .validate_message_index(
                &content.sender_key,
                &content.session_id,
                &event.event_id,
                message_index,
                event.origin_server_ts,
            )
            .map_err(DecryptionError::IndexValidation)?;

        if !accepted {
            tracing::warn!(
                room_id = event.room_id.as_str(),
                event_id = event.event_id.as_str(),
                session_id = content.session_id.as_str(),
                message_index,
                "Rejected duplicate message index"
            );
            return Err(DecryptionError::DuplicateMessageIndex { message_index });
        }

        let payload: MegolmPayload =
            serde_json::from_slice(&decrypted.plaintext).map_err(DecryptionError::PayloadParse)?;

        let mut inner_content = payload.content;
        if let Err(e) = inner_content.parse_raw(&payload.event_type) {
            if !e.is_unsupported() {
                return Err(DecryptionError::ContentParse(e));
            }
            tracing::debug!(
                event_type = payload.event_type.as_str(),
                "Passing through unsupported decrypted content"
            );
        }

        tracing::debug!(
            room_id = event.room_id.as_str(),
            event_id = event.event_id.as_str(),
            message_index,
            "Decrypted group message"
        );

        Ok(Event {
            sender: event.sender.clone(),
            event_type: payload.event_type,
            origin_server_ts: event.origin_server_ts,
            event_id: event.event_id.clone(),
            room_id: event.room_id.clone(),
            content: inner_content,
            unsigned: event.unsigned.clone(),
        })
    }

    /// Load, decrypt and persist under the session lock.
    fn decrypt_with_session(
        &self,
        event: &Event,
        room_id: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
        ciphertext: &[u8],
    ) -> Result<DecryptedGroupMessage, DecryptionError> {
        let lock = self.locks.get(&(room_id.clone(), sender_key.clone(), session_id.clone()));
        let _guard = lock.lock();

        let mut session = self
            .store
            .group_session(room_id, sender_key, session_id)
            .map_err(DecryptionError::SessionLookup)?
            .ok_or_else(|| {
                self.wedge.session_missing(&MissingSession {
                    room_id: room_id.clone(),
                    sender: event.sender.clone(),
                    sender_key: sender_key.clone(),
                    session_id: session_id.clone(),
                    event_id: event.event_id.clone(),
                });
                DecryptionError::NoSessionFound {
                    sender_key: sender_key.clone(),
                    session_id: session_id.clone(),
                }
            })?;

        let latest_before = session.latest_index();
        let decrypted = session.decrypt(ciphertext)?;

        if session.latest_index() != latest_before {
            self.store
                .put_group_session(room_id, sender_key, session_id, &session)
                .map_err(DecryptionError::SessionUpdate)?;
        }

        Ok(decrypted)
    }
}

/// Encrypted content of `event`, parsing the raw content if the typed view
/// was never built.
fn encrypted_content(event: &Event) -> Result<EncryptedContent, DecryptionError> {
    if let Some(content) = event.content.as_encrypted() {
        return Ok(content.clone());
    }

    let incorrect =
        || DecryptionError::IncorrectContentType { event_type: event.event_type.clone() };

    if event.event_type.as_str() != EventType::ROOM_ENCRYPTED || event.content.parsed().is_some() {
        return Err(incorrect());
    }

    let mut content = event.content.clone();
    content.parse_raw(&event.event_type).map_err(|_| incorrect())?;
    content.as_encrypted().cloned().ok_or_else(incorrect)
}
