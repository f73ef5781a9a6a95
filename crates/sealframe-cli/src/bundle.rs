//! Provisioning bundles.
//!
//! A bundle is a JSON document carrying cross-signing keys, signature edges
//! and exported inbound group sessions, produced by whatever performed the
//! key upload or session share. Binary fields are standard base64 (padding
//! optional).

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use sealframe_core::{
    CrossSigningUsage, CryptoStore, RoomId, SenderKey, SessionId, SignatureRecord, SigningKey,
    StorageError, UserId,
};
use sealframe_crypto::{GroupSessionError, InboundGroupSession};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One published cross-signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleKey {
    pub user_id: UserId,
    pub usage: CrossSigningUsage,
    pub key: SigningKey,
}

/// One signature edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSignature {
    pub signed_user: UserId,
    pub signed_key: SigningKey,
    pub signer_user: UserId,
    pub signer_key: SigningKey,
    /// Base64 signature bytes
    #[serde(default)]
    pub signature: String,
}

/// One exported inbound group session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSession {
    pub room_id: RoomId,
    pub sender_key: SenderKey,
    /// Base64 of the persisted session record
    pub session: String,
}

/// Everything a bundle can provision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub cross_signing_keys: Vec<BundleKey>,
    #[serde(default)]
    pub signatures: Vec<BundleSignature>,
    #[serde(default)]
    pub sessions: Vec<BundleSession>,
}

/// Counts of imported records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub keys: usize,
    pub signatures: usize,
    pub sessions: usize,
}

/// Bundle import failures.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("invalid bundle json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} is not base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid group session for room {room_id}: {source}")]
    Session {
        room_id: RoomId,
        #[source]
        source: GroupSessionError,
    },

    #[error("store error: {0}")]
    Store(#[from] StorageError),
}

impl Bundle {
    /// Parse a bundle from JSON text.
    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write every record into `store`.
    ///
    /// Sessions are decoded before anything is written, so a malformed
    /// session leaves the store untouched.
    pub fn import(&self, store: &impl CryptoStore) -> Result<ImportSummary, BundleError> {
        let sessions = self
            .sessions
            .iter()
            .map(|entry| {
                let bytes = BASE64
                    .decode(&entry.session)
                    .map_err(|source| BundleError::Base64 { field: "session", source })?;
                let session = InboundGroupSession::from_bytes(&bytes).map_err(|source| {
                    BundleError::Session { room_id: entry.room_id.clone(), source }
                })?;
                Ok((entry, session))
            })
            .collect::<Result<Vec<_>, BundleError>>()?;

        let signatures = self
            .signatures
            .iter()
            .map(|entry| {
                let signature = BASE64
                    .decode(&entry.signature)
                    .map_err(|source| BundleError::Base64 { field: "signature", source })?;
                Ok(SignatureRecord {
                    signed_user: entry.signed_user.clone(),
                    signed_key: entry.signed_key.clone(),
                    signer_user: entry.signer_user.clone(),
                    signer_key: entry.signer_key.clone(),
                    signature,
                })
            })
            .collect::<Result<Vec<_>, BundleError>>()?;

        for key in &self.cross_signing_keys {
            store.put_cross_signing_key(&key.user_id, key.usage, &key.key)?;
        }

        for record in &signatures {
            store.put_signature(record)?;
        }

        for (entry, session) in &sessions {
            let session_id = SessionId::new(session.session_id());
            store.put_group_session(&entry.room_id, &entry.sender_key, &session_id, session)?;
            tracing::debug!(
                room_id = entry.room_id.as_str(),
                session_id = session_id.as_str(),
                first_known_index = session.first_known_index(),
                "Imported group session"
            );
        }

        Ok(ImportSummary {
            keys: self.cross_signing_keys.len(),
            signatures: signatures.len(),
            sessions: sessions.len(),
        })
    }
}
