//! Symmetric ratchet for per-index message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: Old chain keys are overwritten when advancing
//! - Key Uniqueness: Each message index produces a unique message key
//! - Determinism: Same seed always produces same key sequence

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::GroupSessionError;

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving the next chain key
const CHAIN_LABEL: &[u8] = b"chain";

/// Label for deriving a message key
const MESSAGE_LABEL: &[u8] = b"message";

/// Maximum number of indices a single `advance_to` may skip.
///
/// Bounds the HMAC work a message can force on the cached ratchet. Indices
/// the session has already reached are re-derived from the earliest ratchet
/// without this limit.
pub const MAX_SKIP: u32 = 10_000;

/// A message key derived from the ratchet.
///
/// This key is used for a single message encryption/decryption.
#[derive(Clone)]
pub struct MessageKey {
    /// The 32-byte symmetric key for XChaCha20-Poly1305
    key: [u8; 32],
    /// The message index this key was derived for
    index: u32,
}

impl MessageKey {
    /// 32-byte symmetric key for XChaCha20-Poly1305 AEAD.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Message index this key was derived for.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Forward-secure symmetric ratchet.
///
/// Each [`advance()`](Self::advance) call derives the message key for the
/// current index, replaces the chain key with its successor and increments
/// the index. Cloning is allowed so a receiver can keep an earlier ratchet
/// around for re-deriving keys of messages it has already passed.
#[derive(Clone)]
pub struct SymmetricRatchet {
    /// Current chain key (32 bytes)
    chain_key: [u8; 32],
    /// Index of the next message key this ratchet will yield
    generation: u32,
}

impl SymmetricRatchet {
    /// Create a new ratchet at index 0 from a session seed.
    pub fn new(seed: &[u8; 32]) -> Self {
        Self { chain_key: *seed, generation: 0 }
    }

    /// Restore a ratchet from a persisted chain key and generation.
    pub fn from_parts(chain_key: [u8; 32], generation: u32) -> Self {
        Self { chain_key, generation }
    }

    /// Index of the next message key.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Raw chain key, for persistence only.
    pub(crate) fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Advance the ratchet and return the message key for the current index.
    pub fn advance(&mut self) -> Result<MessageKey, GroupSessionError> {
        if self.generation == u32::MAX {
            return Err(GroupSessionError::GenerationOverflow { current: self.generation });
        }

        let message_key = self.derive(MESSAGE_LABEL);
        let next_chain_key = self.derive(CHAIN_LABEL);

        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let index = self.generation;
        self.generation += 1;

        Ok(MessageKey { key: message_key, index })
    }

    /// Advance the ratchet until it yields the key for `target`.
    ///
    /// Fails if `target` is behind the ratchet or more than [`MAX_SKIP`]
    /// indices ahead of it. On failure the ratchet is left untouched.
    pub fn advance_to(&mut self, target: u32) -> Result<MessageKey, GroupSessionError> {
        if target >= self.generation && target - self.generation > MAX_SKIP {
            return Err(GroupSessionError::SkipTooLarge {
                current: self.generation,
                requested: target,
                max_skip: MAX_SKIP,
            });
        }

        self.advance_to_unbounded(target)
    }

    /// Like [`advance_to`](Self::advance_to) but without the skip limit.
    ///
    /// Only for targets a ratchet of the same session has already passed.
    pub(crate) fn advance_to_unbounded(
        &mut self,
        target: u32,
    ) -> Result<MessageKey, GroupSessionError> {
        if target < self.generation {
            return Err(GroupSessionError::RatchetBehind {
                current: self.generation,
                requested: target,
            });
        }
        if target == u32::MAX {
            return Err(GroupSessionError::GenerationOverflow { current: self.generation });
        }

        loop {
            let message_key = self.advance()?;
            if message_key.index() == target {
                return Ok(message_key);
            }
        }
    }

    fn derive(&self, label: &[u8]) -> [u8; 32] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.chain_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(label);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        key
    }
}

impl Drop for SymmetricRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}
