//! Message encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - random bytes must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use super::{error::GroupSessionError, ratchet::MessageKey};

/// Size of the random suffix in the nonce (20 bytes)
pub const NONCE_RANDOM_SIZE: usize = 20;

/// Size of the full `XChaCha20` nonce
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const POLY1305_TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under a single-use message key.
///
/// Returns `(nonce, ciphertext)`, where the ciphertext carries the 16-byte
/// Poly1305 tag.
pub fn encrypt_message(
    plaintext: &[u8],
    message_key: &MessageKey,
    random_suffix: [u8; NONCE_RANDOM_SIZE],
) -> ([u8; NONCE_SIZE], Vec<u8>) {
    let nonce = build_nonce(message_key.index(), random_suffix);
    let cipher = XChaCha20Poly1305::new(message_key.key().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    (nonce, ciphertext)
}

/// Decrypt a ciphertext produced by [`encrypt_message`].
///
/// # Errors
///
/// - `DecryptionFailed`: nonce does not belong to the key's index, or the
///   authentication tag does not verify
pub fn decrypt_message(
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    message_key: &MessageKey,
) -> Result<Vec<u8>, GroupSessionError> {
    let nonce_index = u32::from_be_bytes([nonce[0], nonce[1], nonce[2], nonce[3]]);
    if nonce_index != message_key.index() {
        return Err(GroupSessionError::DecryptionFailed {
            reason: format!(
                "index mismatch: key is {}, nonce is {nonce_index}",
                message_key.index()
            ),
        });
    }

    let cipher = XChaCha20Poly1305::new(message_key.key().into());
    cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| {
        GroupSessionError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-3: message index (big-endian)
/// - bytes 4-23: random suffix (caller-provided)
fn build_nonce(index: u32, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..4].copy_from_slice(&index.to_be_bytes());
    nonce[4..].copy_from_slice(&random_suffix);
    nonce
}

#[cfg(test)]
mod tests {
    use super::{super::ratchet::SymmetricRatchet, *};

    fn key_at(index: u32) -> MessageKey {
        SymmetricRatchet::new(&[7u8; 32]).advance_to(index).unwrap()
    }

    #[test]
    fn ciphertext_carries_tag() {
        let (_, ciphertext) = encrypt_message(b"test message", &key_at(0), [0; NONCE_RANDOM_SIZE]);
        assert_eq!(ciphertext.len(), b"test message".len() + POLY1305_TAG_SIZE);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let (nonce, ciphertext) = encrypt_message(b"secret", &key_at(0), [0; NONCE_RANDOM_SIZE]);
        let wrong_key = SymmetricRatchet::new(&[8u8; 32]).advance().unwrap();

        assert!(matches!(
            decrypt_message(&nonce, &ciphertext, &wrong_key),
            Err(GroupSessionError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn key_for_other_index_is_rejected_before_aead() {
        let (nonce, ciphertext) = encrypt_message(b"secret", &key_at(3), [1; NONCE_RANDOM_SIZE]);

        assert!(matches!(
            decrypt_message(&nonce, &ciphertext, &key_at(4)),
            Err(GroupSessionError::DecryptionFailed { reason }) if reason.contains("index mismatch")
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let key = key_at(1);
        let (nonce, mut ciphertext) = encrypt_message(b"original", &key, [0; NONCE_RANDOM_SIZE]);
        ciphertext[0] ^= 0xFF;

        assert!(decrypt_message(&nonce, &ciphertext, &key).is_err());
    }

    #[test]
    fn nonce_structure() {
        let nonce = build_nonce(0x0102_0304, [0xAB; NONCE_RANDOM_SIZE]);
        assert_eq!(&nonce[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&nonce[4..], &[0xAB; NONCE_RANDOM_SIZE]);
    }
}
