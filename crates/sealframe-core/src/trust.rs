//! Trust states and device identities.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, SenderKey, SigningKey, UserId};

/// Trust classification of a device.
///
/// Not an ordering: `Verified` and `Blacklisted` are local decisions that
/// cross-signing never overrides, while the other three are recomputed from
/// signatures on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustState {
    /// No trust basis found.
    #[default]
    Unset,
    /// Signed by its owner's master key, but the owner is not trusted.
    #[serde(rename = "cross-signed-untrusted")]
    CrossSigned,
    /// Signed by its owner's master key, which our user-signing key signed.
    CrossSignedTrusted,
    /// Verified out of band.
    Verified,
    /// Explicitly never trusted.
    Blacklisted,
}

impl TrustState {
    /// `Verified` and `Blacklisted` are never changed by trust resolution.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Blacklisted)
    }

    /// Whether a device in this state may be treated as trusted.
    pub fn is_trusted(self) -> bool {
        matches!(self, Self::Verified | Self::CrossSigned | Self::CrossSignedTrusted)
    }

    /// Stable string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::CrossSigned => "cross-signed-untrusted",
            Self::CrossSignedTrusted => "cross-signed-trusted",
            Self::Verified => "verified",
            Self::Blacklisted => "blacklisted",
        }
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized trust state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trust state: {0}")]
pub struct UnknownTrustState(pub String);

impl FromStr for TrustState {
    type Err = UnknownTrustState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "cross-signed-untrusted" => Ok(Self::CrossSigned),
            "cross-signed-trusted" => Ok(Self::CrossSignedTrusted),
            "verified" => Ok(Self::Verified),
            "blacklisted" => Ok(Self::Blacklisted),
            other => Err(UnknownTrustState(other.to_owned())),
        }
    }
}

/// A remote device and its locally recorded trust decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Owning user
    pub user_id: UserId,
    /// Device identifier
    pub device_id: DeviceId,
    /// Curve25519 identity key
    pub identity_key: SenderKey,
    /// Ed25519 device signing key
    pub signing_key: SigningKey,
    /// Locally recorded trust state
    #[serde(default)]
    pub trust: TrustState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_through_from_str() {
        for state in [
            TrustState::Unset,
            TrustState::CrossSigned,
            TrustState::CrossSignedTrusted,
            TrustState::Verified,
            TrustState::Blacklisted,
        ] {
            assert_eq!(state.as_str().parse::<TrustState>(), Ok(state));
        }
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&TrustState::CrossSigned).unwrap();
        assert_eq!(json, "\"cross-signed-untrusted\"");
        let json = serde_json::to_string(&TrustState::CrossSignedTrusted).unwrap();
        assert_eq!(json, "\"cross-signed-trusted\"");
    }

    #[test]
    fn only_local_decisions_are_terminal() {
        assert!(TrustState::Verified.is_terminal());
        assert!(TrustState::Blacklisted.is_terminal());
        assert!(!TrustState::CrossSignedTrusted.is_terminal());
        assert!(!TrustState::Blacklisted.is_trusted());
        assert!(!TrustState::Unset.is_trusted());
    }

    #[test]
    fn unknown_name_is_rejected() {
        insta::assert_snapshot!(
            "trusted".parse::<TrustState>().unwrap_err().to_string(),
            @"unknown trust state: trusted"
        );
    }
}
