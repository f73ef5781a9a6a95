//! Identifiers and cross-signing key types.
//!
//! All identifiers are opaque strings on the wire. Newtypes keep a user ID
//! from being passed where a signing key is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Fully qualified user identifier, e.g. `@alice:example.org`.
    UserId
);
string_id!(
    /// Device identifier, unique per user.
    DeviceId
);
string_id!(
    /// Room identifier.
    RoomId
);
string_id!(
    /// Event identifier assigned by the server.
    EventId
);
string_id!(
    /// Group session identifier (base64 of the session's Ed25519 key).
    SessionId
);
string_id!(
    /// Curve25519 identity key of the sending device.
    SenderKey
);
string_id!(
    /// Ed25519 public key: a device key or a cross-signing key.
    SigningKey
);

/// Role of a cross-signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossSigningUsage {
    /// Root of trust for a user.
    Master,
    /// Signs the user's own devices.
    SelfSigning,
    /// Signs other users' master keys.
    UserSigning,
}

impl CrossSigningUsage {
    /// Stable string form used in storage keys and bundles.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::SelfSigning => "self_signing",
            Self::UserSigning => "user_signing",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "master" => Some(Self::Master),
            "self_signing" => Some(Self::SelfSigning),
            "user_signing" => Some(Self::UserSigning),
            _ => None,
        }
    }
}

impl fmt::Display for CrossSigningUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local account's complete cross-signing public key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossSigningPublicKeys {
    /// Master key
    pub master: SigningKey,
    /// Self-signing key
    pub self_signing: SigningKey,
    /// User-signing key
    pub user_signing: SigningKey,
}

/// A recorded signature edge: `signer` signed `signed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Owner of the signed key
    pub signed_user: UserId,
    /// Key that was signed
    pub signed_key: SigningKey,
    /// Owner of the signing key
    pub signer_user: UserId,
    /// Key that produced the signature
    pub signer_key: SigningKey,
    /// Raw signature bytes
    #[serde(default)]
    pub signature: Vec<u8>,
}
