//! Sealframe Cryptographic Primitives
//!
//! Group-session building blocks for Sealframe. Pure functions with
//! deterministic outputs. Callers provide random bytes for deterministic
//! testing.
//!
//! # Key Lifecycle
//!
//! A sender creates an [`OutboundGroupSession`] and shares its inbound half
//! out of band. Each message advances a symmetric ratchet by one index; the
//! message key for that index encrypts exactly one payload and is zeroized
//! afterwards. The inbound half can be persisted with
//! [`InboundGroupSession::to_bytes`] and restored later.
//!
//! # Security
//!
//! Authenticity:
//! - Ed25519 signature over header and ciphertext, checked before any key
//!   derivation
//! - XChaCha20-Poly1305 AEAD rejects tampered ciphertext
//!
//! Bounded work:
//! - A message cannot move the cached ratchet more than [`MAX_SKIP`] steps
//!   ahead
//! - Re-deriving an older index costs at most the distance the session has
//!   already advanced

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod group;

pub use group::{
    DecryptedGroupMessage, GroupSessionError, InboundGroupSession, MAX_SKIP, MessageKey,
    NONCE_RANDOM_SIZE, OutboundGroupSession, SymmetricRatchet, decrypt_message,
    derive_session_seed, encrypt_message,
};
