//! Cross-signing trust resolution.
//!
//! Trust is a two-hop chain. A device is cross-signed when its key carries a
//! signature from its owner's self-signing key, which in turn carries a
//! signature from the owner's master key. The owner is trusted when their
//! master key carries a signature from our user-signing key, and our
//! user-signing key is itself signed by our master key.
//!
//! Every query here is total. Store errors and missing keys are logged and
//! answered with the least trusting value; nothing is returned to the caller
//! that could be mistaken for trust.

use crate::{
    ids::{CrossSigningPublicKeys, CrossSigningUsage, SigningKey, UserId},
    storage::CryptoStore,
    trust::{DeviceIdentity, TrustState},
};

/// Resolves device and user trust from signatures in a [`CryptoStore`].
///
/// Holds no cache. Every call reads the store, so a removed signature takes
/// effect on the next query.
#[derive(Clone)]
pub struct TrustResolver<S: CryptoStore> {
    store: S,
    own_user: UserId,
}

impl<S: CryptoStore> TrustResolver<S> {
    /// Create a resolver anchored at the local account `own_user`.
    pub fn new(store: S, own_user: UserId) -> Self {
        Self { store, own_user }
    }

    /// The local account.
    pub fn own_user(&self) -> &UserId {
        &self.own_user
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the local account's three cross-signing public keys.
    ///
    /// `None` if the store fails or any of the three keys is missing.
    pub fn own_cross_signing_keys(&self) -> Option<CrossSigningPublicKeys> {
        let user_id = self.own_user.as_str();

        let mut keys = match self.store.cross_signing_keys(&self.own_user) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load own cross-signing keys");
                return None;
            },
        };

        let master = keys.remove(&CrossSigningUsage::Master);
        let self_signing = keys.remove(&CrossSigningUsage::SelfSigning);
        let user_signing = keys.remove(&CrossSigningUsage::UserSigning);

        match (master, self_signing, user_signing) {
            (Some(master), Some(self_signing), Some(user_signing)) => {
                Some(CrossSigningPublicKeys { master, self_signing, user_signing })
            },
            (master, self_signing, user_signing) => {
                tracing::warn!(
                    user_id,
                    has_master = master.is_some(),
                    has_self_signing = self_signing.is_some(),
                    has_user_signing = user_signing.is_some(),
                    "Own cross-signing keys incomplete"
                );
                None
            },
        }
    }

    /// Whether `device_key` is signed by `user`'s self-signing key, and that
    /// key by `user`'s master key.
    pub fn is_key_cross_signed(&self, user: &UserId, device_key: &SigningKey) -> bool {
        let user_id = user.as_str();

        let keys = match self.store.cross_signing_keys(user) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load cross-signing keys");
                return false;
            },
        };

        let Some(master) = keys.get(&CrossSigningUsage::Master) else {
            tracing::warn!(user_id, "Master key missing, device not cross-signed");
            return false;
        };
        let Some(self_signing) = keys.get(&CrossSigningUsage::SelfSigning) else {
            tracing::warn!(user_id, "Self-signing key missing, device not cross-signed");
            return false;
        };

        match self.store.is_key_signed_by(user, self_signing, user, master) {
            Ok(true) => {},
            Ok(false) => {
                tracing::warn!(user_id, "Self-signing key not signed by master key");
                return false;
            },
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to check self-signing key signature");
                return false;
            },
        }

        match self.store.is_key_signed_by(user, device_key, user, self_signing) {
            Ok(signed) => signed,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to check device key signature");
                false
            },
        }
    }

    /// Classify a device.
    ///
    /// `Verified` and `Blacklisted` are returned as recorded without touching
    /// the store.
    pub fn resolve_trust(&self, device: &DeviceIdentity) -> TrustState {
        if device.trust.is_terminal() {
            return device.trust;
        }

        if !self.is_key_cross_signed(&device.user_id, &device.signing_key) {
            return TrustState::Unset;
        }

        if self.is_user_trusted(&device.user_id) {
            TrustState::CrossSignedTrusted
        } else {
            TrustState::CrossSigned
        }
    }

    /// Whether a device may be treated as trusted.
    pub fn is_device_trusted(&self, device: &DeviceIdentity) -> bool {
        self.resolve_trust(device).is_trusted()
    }

    /// Whether our user-signing key vouches for `user`.
    ///
    /// The local account trusts itself, but only while its own cross-signing
    /// keys load. Without them nothing is trusted.
    pub fn is_user_trusted(&self, user: &UserId) -> bool {
        let Some(own) = self.own_cross_signing_keys() else {
            return false;
        };

        if *user == self.own_user {
            return true;
        }

        let own_user_id = self.own_user.as_str();
        match self.store.signatures_for_key_by(&self.own_user, &own.user_signing, &self.own_user) {
            Ok(signatures) if signatures.contains_key(&own.master) => {},
            Ok(_) => {
                tracing::error!(
                    user_id = own_user_id,
                    "Own user-signing key is not signed by own master key"
                );
                return false;
            },
            Err(e) => {
                tracing::error!(
                    user_id = own_user_id,
                    error = %e,
                    "Failed to load own user-signing key signatures"
                );
                return false;
            },
        }

        let user_id = user.as_str();
        let master = match self.store.cross_signing_keys(user) {
            Ok(mut keys) => match keys.remove(&CrossSigningUsage::Master) {
                Some(master) => master,
                None => {
                    tracing::warn!(user_id, "Master key missing, user not trusted");
                    return false;
                },
            },
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load cross-signing keys");
                return false;
            },
        };

        match self.store.is_key_signed_by(user, &master, &self.own_user, &own.user_signing) {
            Ok(signed) => signed,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to check master key signature");
                false
            },
        }
    }
}
