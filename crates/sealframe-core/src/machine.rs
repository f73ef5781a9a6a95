//! Trust and decryption behind one store and one local account.

use std::sync::Arc;

use crate::{
    config::MachineConfig,
    decrypt::GroupDecryptor,
    error::DecryptionError,
    event::Event,
    ids::{CrossSigningPublicKeys, SigningKey, UserId},
    resolver::TrustResolver,
    storage::CryptoStore,
    trust::{DeviceIdentity, TrustState},
    wedge::{NoWedgeCheck, TracingWedgeCheck, WedgeCheck},
};

/// Entry point for a host: trust queries and group decryption for the
/// local account `own_user`.
pub struct Machine<S: CryptoStore> {
    resolver: TrustResolver<S>,
    decryptor: GroupDecryptor<S>,
}

impl<S: CryptoStore> Machine<S> {
    /// Create a machine with default configuration.
    pub fn new(store: S, own_user: UserId) -> Self {
        Self::with_config(store, own_user, &MachineConfig::default())
    }

    /// Create a machine from explicit configuration.
    ///
    /// With `wedge_check` on, missing sessions are logged; install a
    /// different hook with [`set_wedge_check`](Self::set_wedge_check).
    pub fn with_config(store: S, own_user: UserId, config: &MachineConfig) -> Self {
        let wedge: Arc<dyn WedgeCheck> =
            if config.wedge_check { Arc::new(TracingWedgeCheck) } else { Arc::new(NoWedgeCheck) };

        Self {
            resolver: TrustResolver::new(store.clone(), own_user),
            decryptor: GroupDecryptor::with_parts(store, wedge, config.lock_prune_threshold),
        }
    }

    /// Replace the missing-session hook.
    pub fn set_wedge_check(&mut self, wedge: Arc<dyn WedgeCheck>) {
        self.decryptor.set_wedge_check(wedge);
    }

    /// The local account.
    pub fn own_user(&self) -> &UserId {
        self.resolver.own_user()
    }

    /// The shared store.
    pub fn store(&self) -> &S {
        self.resolver.store()
    }

    /// See [`TrustResolver::own_cross_signing_keys`].
    pub fn own_cross_signing_keys(&self) -> Option<CrossSigningPublicKeys> {
        self.resolver.own_cross_signing_keys()
    }

    /// See [`TrustResolver::is_key_cross_signed`].
    pub fn is_key_cross_signed(&self, user: &UserId, device_key: &SigningKey) -> bool {
        self.resolver.is_key_cross_signed(user, device_key)
    }

    /// See [`TrustResolver::resolve_trust`].
    pub fn resolve_trust(&self, device: &DeviceIdentity) -> TrustState {
        self.resolver.resolve_trust(device)
    }

    /// See [`TrustResolver::is_device_trusted`].
    pub fn is_device_trusted(&self, device: &DeviceIdentity) -> bool {
        self.resolver.is_device_trusted(device)
    }

    /// See [`TrustResolver::is_user_trusted`].
    pub fn is_user_trusted(&self, user: &UserId) -> bool {
        self.resolver.is_user_trusted(user)
    }

    /// See [`GroupDecryptor::decrypt_megolm_event`].
    pub fn decrypt_megolm_event(&self, event: &Event) -> Result<Event, DecryptionError> {
        self.decryptor.decrypt_megolm_event(event)
    }
}
