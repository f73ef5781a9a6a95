//! Per-session mutual exclusion.
//!
//! Decrypting advances a session's cached ratchet, so load, decrypt and
//! persist must not interleave for the same session. Different sessions
//! never contend.

#![allow(clippy::disallowed_types, reason = "Blocking per-session locks, no async")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::ids::{RoomId, SenderKey, SessionId};

/// Identifies one group session.
pub type SessionKey = (RoomId, SenderKey, SessionId);

/// Lock table keyed by `(room, sender key, session id)`.
///
/// Entries are created on demand. Once the table grows past
/// `prune_threshold`, entries no caller holds are dropped.
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
    prune_threshold: usize,
}

impl SessionLocks {
    /// Create an empty lock table.
    pub fn new(prune_threshold: usize) -> Self {
        Self { locks: Mutex::new(HashMap::new()), prune_threshold }
    }

    /// Get the lock for `key`, creating it if absent.
    ///
    /// Lock the returned mutex with [`SessionLock::lock`].
    pub fn get(&self, key: &SessionKey) -> SessionLock {
        // A panic while holding the table lock cannot leave the map invalid.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if locks.len() >= self.prune_threshold {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        let lock = locks.entry(key.clone()).or_default();
        SessionLock(Arc::clone(lock))
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one session's lock.
pub struct SessionLock(Arc<Mutex<()>>);

impl SessionLock {
    /// Block until this session is free.
    ///
    /// Poisoning is ignored: the guarded state lives in the store, which
    /// only ever sees complete writes.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
