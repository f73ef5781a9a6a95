//! Seed derivation for group sessions using HKDF

use hkdf::Hkdf;
use sha2::Sha256;

/// Label used for group session seed derivation
const SESSION_SEED_LABEL: &[u8] = b"sealframeGroupV1";

/// Derive the initial chain key of a group session.
///
/// Binds the seed to the session's public signing key so that two sessions
/// sharing secret material never share a key sequence.
pub fn derive_session_seed(session_secret: &[u8], signing_public_key: &[u8; 32]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, session_secret);

    let mut info = Vec::with_capacity(SESSION_SEED_LABEL.len() + signing_public_key.len());
    info.extend_from_slice(SESSION_SEED_LABEL);
    info.extend_from_slice(signing_public_key);

    let mut seed = [0u8; 32];
    let Ok(()) = hkdf.expand(&info, &mut seed) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    seed
}
