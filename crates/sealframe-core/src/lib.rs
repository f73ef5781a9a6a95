//! Sealframe trust and decryption core.
//!
//! Resolves whether a remote device is trusted from cross-signing signature
//! chains, and decrypts group-encrypted room events while refusing to accept
//! any message index twice.
//!
//! # Architecture
//!
//! Both components share one injected [`CryptoStore`]. Neither spawns tasks
//! or caches store data; every operation is synchronous and returns after a
//! handful of store round trips.
//!
//! # Components
//!
//! - [`TrustResolver`]: total trust queries that fail closed
//! - [`GroupDecryptor`]: typed-error decryption with replay protection
//! - [`Machine`]: both of the above around one store and one local account
//! - [`storage`]: the store trait plus memory, redb and fault-injecting
//!   implementations
//!
//! # Error policy
//!
//! Trust queries never return errors. Store failures and missing keys are
//! logged and answered with the least trusting value. Decryption returns a
//! [`DecryptionError`] variant per failure so callers can choose a recovery.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod decrypt;
mod error;
pub mod event;
pub mod ids;
mod locks;
mod machine;
mod resolver;
pub mod storage;
mod trust;
mod wedge;

pub use config::MachineConfig;
pub use decrypt::{DEFAULT_LOCK_PRUNE_THRESHOLD, GroupDecryptor};
pub use error::DecryptionError;
pub use event::{Content, ContentError, EncryptedContent, Event, EventError, EventType};
pub use ids::{
    CrossSigningPublicKeys, CrossSigningUsage, DeviceId, EventId, RoomId, SenderKey, SessionId,
    SignatureRecord, SigningKey, UserId,
};
pub use locks::{SessionKey, SessionLock, SessionLocks};
pub use machine::Machine;
pub use resolver::TrustResolver;
pub use storage::{ChaoticStore, CryptoStore, MemoryStore, RedbStore, StorageError};
pub use trust::{DeviceIdentity, TrustState, UnknownTrustState};
pub use wedge::{ChannelWedgeCheck, MissingSession, NoWedgeCheck, TracingWedgeCheck, WedgeCheck};
