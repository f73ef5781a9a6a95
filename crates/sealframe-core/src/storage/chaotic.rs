//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that randomly fails operations to test fail-closed trust
//! resolution and typed decryption errors. With a failure rate of 1.0 every
//! call fails, which doubles as a probe that an operation never touched the
//! store.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use sealframe_crypto::InboundGroupSession;

use super::{CryptoStore, StorageError};
use crate::ids::{
    CrossSigningUsage, EventId, RoomId, SenderKey, SessionId, SignatureRecord, SigningKey, UserId,
};

/// Chaotic store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations with the
/// configured probability, before the inner store is touched. Clone shares
/// the RNG and the operation counter.
#[derive(Clone)]
pub struct ChaoticStore<S: CryptoStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted, including failed ones
    operation_count: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator so chaos tests are reproducible with the
/// same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: CryptoStore> ChaoticStore<S> {
    /// Create a new chaotic store wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store on which every operation fails.
    pub fn always_failing(inner: S) -> Self {
        Self::new(inner, 1.0)
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of store operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Count the operation and decide whether it fails.
    fn attempt(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_fail(self.failure_rate);

        if fail { Err(StorageError::Io("chaotic failure injection".to_string())) } else { Ok(()) }
    }
}

impl<S: CryptoStore> CryptoStore for ChaoticStore<S> {
    fn cross_signing_keys(
        &self,
        user: &UserId,
    ) -> Result<HashMap<CrossSigningUsage, SigningKey>, StorageError> {
        self.attempt()?;
        self.inner.cross_signing_keys(user)
    }

    fn put_cross_signing_key(
        &self,
        user: &UserId,
        usage: CrossSigningUsage,
        key: &SigningKey,
    ) -> Result<(), StorageError> {
        self.attempt()?;
        self.inner.put_cross_signing_key(user, usage, key)
    }

    fn is_key_signed_by(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        self.attempt()?;
        self.inner.is_key_signed_by(signed_user, signed_key, signer_user, signer_key)
    }

    fn signatures_for_key_by(
        &self,
        key_owner: &UserId,
        key: &SigningKey,
        signer_user: &UserId,
    ) -> Result<HashMap<SigningKey, Vec<u8>>, StorageError> {
        self.attempt()?;
        self.inner.signatures_for_key_by(key_owner, key, signer_user)
    }

    fn put_signature(&self, record: &SignatureRecord) -> Result<(), StorageError> {
        self.attempt()?;
        self.inner.put_signature(record)
    }

    fn remove_signature(
        &self,
        signed_user: &UserId,
        signed_key: &SigningKey,
        signer_user: &UserId,
        signer_key: &SigningKey,
    ) -> Result<bool, StorageError> {
        self.attempt()?;
        self.inner.remove_signature(signed_user, signed_key, signer_user, signer_key)
    }

    fn group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
    ) -> Result<Option<InboundGroupSession>, StorageError> {
        self.attempt()?;
        self.inner.group_session(room, sender_key, session_id)
    }

    fn put_group_session(
        &self,
        room: &RoomId,
        sender_key: &SenderKey,
        session_id: &SessionId,
        session: &InboundGroupSession,
    ) -> Result<(), StorageError> {
        self.attempt()?;
        self.inner.put_group_session(room, sender_key, session_id, session)
    }

    fn validate_message_index(
        &self,
        sender_key: &SenderKey,
        session_id: &SessionId,
        event_id: &EventId,
        index: u32,
        timestamp: u64,
    ) -> Result<bool, StorageError> {
        self.attempt()?;
        self.inner.validate_message_index(sender_key, session_id, event_id, index, timestamp)
    }
}
