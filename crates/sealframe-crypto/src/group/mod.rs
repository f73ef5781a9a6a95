//! Group sessions: per-sender symmetric ratchets for room messages
//!
//! # Architecture
//!
//! ```text
//! Session Secret + Ed25519 Public Key
//!        │
//!        ▼ HKDF-Expand
//! Initial Chain Key
//!        │
//!        ▼ Initialize
//! SymmetricRatchet
//!        │
//!        ▼ Advance to message index
//! MessageKey[index]
//!        │
//!        ▼ Encrypt + Sign
//! XChaCha20-Poly1305 Ciphertext, Ed25519 Signature
//! ```
//!
//! # Security Properties
//!
//! - Forward Secrecy: the cached ratchet only moves forward
//! - Authenticity: every message is signed by the session's Ed25519 key
//! - Replay protection is NOT provided here; a session decrypts the same
//!   index as often as asked. Callers track claimed indices.

pub mod derivation;
pub mod encryption;
pub mod error;
pub mod ratchet;
pub mod session;

pub use derivation::derive_session_seed;
pub use encryption::{NONCE_RANDOM_SIZE, decrypt_message, encrypt_message};
pub use error::GroupSessionError;
pub use ratchet::{MAX_SKIP, MessageKey, SymmetricRatchet};
pub use session::{
    DecryptedGroupMessage, GROUP_MESSAGE_VERSION, GroupMessage, INBOUND_SESSION_SIZE,
    InboundGroupSession, OutboundGroupSession,
};
