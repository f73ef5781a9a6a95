//! Inbound and outbound group sessions and their wire format
//!
//! A group session pairs a [`SymmetricRatchet`] with an Ed25519 key. The
//! sender signs every message; receivers hold only the verifying key.
//!
//! # Wire Format
//!
//! ```text
//! [version: 1][message_index: 4 BE][nonce: 24][ciphertext + tag][signature: 64]
//! ```
//!
//! The signature covers every byte that precedes it.

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::{
    derivation::derive_session_seed,
    encryption::{NONCE_RANDOM_SIZE, NONCE_SIZE, POLY1305_TAG_SIZE, decrypt_message, encrypt_message},
    error::GroupSessionError,
    ratchet::SymmetricRatchet,
};

/// Current wire format version
pub const GROUP_MESSAGE_VERSION: u8 = 3;

/// Ed25519 signature length
const SIGNATURE_SIZE: usize = 64;

/// Version byte, message index and nonce
const HEADER_SIZE: usize = 1 + 4 + NONCE_SIZE;

/// Smallest well-formed message: empty plaintext
const MIN_MESSAGE_SIZE: usize = HEADER_SIZE + POLY1305_TAG_SIZE + SIGNATURE_SIZE;

/// Encoded length of an [`InboundGroupSession`]
pub const INBOUND_SESSION_SIZE: usize = 4 + 32 + 4 + 32 + 32;

/// Borrowed view over a decoded group message.
#[derive(Debug)]
pub struct GroupMessage<'a> {
    /// Ratchet index the message was encrypted at
    pub message_index: u32,
    /// AEAD nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including Poly1305 tag
    pub ciphertext: &'a [u8],
    signed: &'a [u8],
    signature: Signature,
}

impl<'a> GroupMessage<'a> {
    /// Parse wire bytes without verifying anything.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, GroupSessionError> {
        if bytes.len() < MIN_MESSAGE_SIZE {
            return Err(GroupSessionError::InvalidMessage {
                reason: format!("{} bytes, need at least {MIN_MESSAGE_SIZE}", bytes.len()),
            });
        }

        if bytes[0] != GROUP_MESSAGE_VERSION {
            return Err(GroupSessionError::UnsupportedVersion(bytes[0]));
        }

        let (signed, signature_bytes) = bytes.split_at(bytes.len() - SIGNATURE_SIZE);
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(signature_bytes);

        let message_index = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[5..HEADER_SIZE]);

        Ok(Self {
            message_index,
            nonce,
            ciphertext: &signed[HEADER_SIZE..],
            signed,
            signature: Signature::from_bytes(&signature),
        })
    }

    fn verify(&self, key: &VerifyingKey) -> Result<(), GroupSessionError> {
        key.verify(self.signed, &self.signature).map_err(|_| GroupSessionError::BadSignature)
    }
}

/// Plaintext recovered from a group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedGroupMessage {
    /// Decrypted payload
    pub plaintext: Vec<u8>,
    /// Ratchet index the payload was encrypted at
    pub message_index: u32,
}

/// Sending side of a group session.
///
/// Exists for provisioning and tests; decryption never needs it.
pub struct OutboundGroupSession {
    ratchet: SymmetricRatchet,
    signing_key: SigningKey,
}

impl OutboundGroupSession {
    /// Create a session from caller-provided secret material.
    ///
    /// Randomness is supplied by the caller so construction stays
    /// deterministic under test.
    pub fn new(session_secret: &[u8], signing_seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&signing_seed);
        let seed = derive_session_seed(session_secret, signing_key.verifying_key().as_bytes());

        Self { ratchet: SymmetricRatchet::new(&seed), signing_key }
    }

    /// Session identifier: unpadded base64 of the Ed25519 public key.
    pub fn session_id(&self) -> String {
        STANDARD_NO_PAD.encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Index the next message will be encrypted at.
    pub fn message_index(&self) -> u32 {
        self.ratchet.generation()
    }

    /// Encrypt and sign `plaintext`, advancing the ratchet.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        random_suffix: [u8; NONCE_RANDOM_SIZE],
    ) -> Result<Vec<u8>, GroupSessionError> {
        let message_key = self.ratchet.advance()?;
        let (nonce, ciphertext) = encrypt_message(plaintext, &message_key, random_suffix);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + ciphertext.len() + SIGNATURE_SIZE);
        bytes.push(GROUP_MESSAGE_VERSION);
        bytes.extend_from_slice(&message_key.index().to_be_bytes());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);

        let signature = self.signing_key.sign(&bytes);
        bytes.extend_from_slice(&signature.to_bytes());

        Ok(bytes)
    }

    /// Export the receiving side, starting at the current index.
    pub fn inbound_session(&self) -> InboundGroupSession {
        InboundGroupSession {
            initial: self.ratchet.clone(),
            latest: self.ratchet.clone(),
            signing_key: self.signing_key.verifying_key(),
        }
    }
}

/// Receiving side of a group session.
///
/// Keeps the earliest ratchet it was given plus a cached ratchet that moves
/// forward with decryption. Any index at or after the first known index can
/// be decrypted, any number of times.
///
/// # Invariants
///
/// - `latest.generation() >= initial.generation()`
/// - `initial` never changes after construction
#[derive(Clone)]
pub struct InboundGroupSession {
    initial: SymmetricRatchet,
    latest: SymmetricRatchet,
    signing_key: VerifyingKey,
}

impl InboundGroupSession {
    /// Session identifier: unpadded base64 of the Ed25519 public key.
    pub fn session_id(&self) -> String {
        STANDARD_NO_PAD.encode(self.signing_key.as_bytes())
    }

    /// Earliest message index this session can decrypt.
    pub fn first_known_index(&self) -> u32 {
        self.initial.generation()
    }

    /// Index the cached ratchet will yield next.
    pub fn latest_index(&self) -> u32 {
        self.latest.generation()
    }

    /// Verify and decrypt a group message.
    ///
    /// Advances the cached ratchet when the message is at or beyond it, so
    /// callers sharing one session must serialize calls.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` / `UnsupportedVersion`: malformed wire bytes
    /// - `BadSignature`: not signed by this session's key
    /// - `UnknownMessageIndex`: index precedes the first known index
    /// - `SkipTooLarge`: index is more than [`MAX_SKIP`](super::MAX_SKIP)
    ///   past the cached ratchet
    /// - `DecryptionFailed`: authentication tag mismatch
    pub fn decrypt(&mut self, bytes: &[u8]) -> Result<DecryptedGroupMessage, GroupSessionError> {
        let message = GroupMessage::decode(bytes)?;
        message.verify(&self.signing_key)?;

        let index = message.message_index;
        let first_known = self.first_known_index();
        if index < first_known {
            return Err(GroupSessionError::UnknownMessageIndex { first_known, requested: index });
        }

        if index >= self.latest.generation() {
            let mut ratchet = self.latest.clone();
            let message_key = ratchet.advance_to(index)?;
            let plaintext = decrypt_message(&message.nonce, message.ciphertext, &message_key)?;
            self.latest = ratchet;
            return Ok(DecryptedGroupMessage { plaintext, message_index: index });
        }

        // Below the cached ratchet: the distance is bounded by progress an
        // authenticated message already made.
        let message_key = self.initial.clone().advance_to_unbounded(index)?;
        let plaintext = decrypt_message(&message.nonce, message.ciphertext, &message_key)?;

        Ok(DecryptedGroupMessage { plaintext, message_index: index })
    }

    /// Encode as a fixed-size big-endian record.
    ///
    /// Layout: `[first_known: 4][initial chain: 32][latest index: 4]
    /// [latest chain: 32][signing key: 32]`
    pub fn to_bytes(&self) -> [u8; INBOUND_SESSION_SIZE] {
        let mut bytes = [0u8; INBOUND_SESSION_SIZE];
        bytes[0..4].copy_from_slice(&self.initial.generation().to_be_bytes());
        bytes[4..36].copy_from_slice(self.initial.chain_key());
        bytes[36..40].copy_from_slice(&self.latest.generation().to_be_bytes());
        bytes[40..72].copy_from_slice(self.latest.chain_key());
        bytes[72..104].copy_from_slice(self.signing_key.as_bytes());
        bytes
    }

    /// Decode a record produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GroupSessionError> {
        if bytes.len() != INBOUND_SESSION_SIZE {
            return Err(GroupSessionError::InvalidSessionBytes {
                reason: format!("expected {INBOUND_SESSION_SIZE} bytes, got {}", bytes.len()),
            });
        }

        let initial = SymmetricRatchet::from_parts(array_at(bytes, 4), u32_at(bytes, 0));
        let latest = SymmetricRatchet::from_parts(array_at(bytes, 40), u32_at(bytes, 36));

        if latest.generation() < initial.generation() {
            return Err(GroupSessionError::InvalidSessionBytes {
                reason: format!(
                    "latest index {} precedes first known index {}",
                    latest.generation(),
                    initial.generation()
                ),
            });
        }

        let signing_key = VerifyingKey::from_bytes(&array_at(bytes, 72)).map_err(|e| {
            GroupSessionError::InvalidSessionBytes { reason: format!("signing key: {e}") }
        })?;

        Ok(Self { initial, latest, signing_key })
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn array_at(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes[offset..offset + 32]);
    buf
}
