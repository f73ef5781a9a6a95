//! Property-based tests for group sessions
//!
//! These tests verify the invariants the decryption pipeline relies on:
//!
//! 1. **Round-trip**: an inbound session decrypts every message its
//!    outbound half produced, in any order
//! 2. **Index reporting**: the reported index equals the sender's index
//! 3. **Persistence**: a session restored from bytes behaves identically
//! 4. **Tamper evidence**: any single flipped byte is rejected

use proptest::prelude::*;
use sealframe_crypto::{
    GroupSessionError, InboundGroupSession, NONCE_RANDOM_SIZE, OutboundGroupSession,
};

fn seed_strategy() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32..=32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_out_of_order_roundtrip(
        secret in prop::collection::vec(any::<u8>(), 0..64),
        signing_seed in seed_strategy(),
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..12),
        order_seed in any::<u64>(),
    ) {
        let mut outbound = OutboundGroupSession::new(&secret, signing_seed);
        let mut inbound = outbound.inbound_session();

        let mut messages: Vec<(u32, Vec<u8>, Vec<u8>)> = payloads
            .iter()
            .map(|p| {
                let index = outbound.message_index();
                (index, p.clone(), outbound.encrypt(p, [index as u8; NONCE_RANDOM_SIZE]).unwrap())
            })
            .collect();

        // Deterministic shuffle
        let len = messages.len();
        for i in 0..len {
            let j = ((order_seed.rotate_left(i as u32) as usize) ^ i) % len;
            messages.swap(i, j);
        }

        for (index, plaintext, bytes) in &messages {
            let decrypted = inbound.decrypt(bytes).unwrap();
            prop_assert_eq!(&decrypted.plaintext, plaintext);
            prop_assert_eq!(decrypted.message_index, *index);
        }

        prop_assert_eq!(inbound.latest_index(), outbound.message_index());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_restored_session_is_equivalent(
        signing_seed in seed_strategy(),
        sent in 1usize..10,
        decrypted_before_save in 0usize..10,
    ) {
        let mut outbound = OutboundGroupSession::new(b"secret", signing_seed);
        let mut inbound = outbound.inbound_session();
        let messages: Vec<Vec<u8>> =
            (0..sent).map(|i| outbound.encrypt(&[i as u8], [0; NONCE_RANDOM_SIZE]).unwrap()).collect();

        for bytes in messages.iter().take(decrypted_before_save) {
            inbound.decrypt(bytes).unwrap();
        }

        let mut restored = InboundGroupSession::from_bytes(&inbound.to_bytes()).unwrap();
        prop_assert_eq!(restored.first_known_index(), inbound.first_known_index());
        prop_assert_eq!(restored.latest_index(), inbound.latest_index());

        for bytes in &messages {
            prop_assert_eq!(restored.decrypt(bytes).unwrap(), inbound.decrypt(bytes).unwrap());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_any_flipped_byte_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..100),
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut outbound = OutboundGroupSession::new(b"secret", [3; 32]);
        let mut inbound = outbound.inbound_session();

        let mut bytes = outbound.encrypt(&plaintext, [0; NONCE_RANDOM_SIZE]).unwrap();
        let at = position.index(bytes.len());
        bytes[at] ^= mask;

        let result = inbound.decrypt(&bytes);
        prop_assert!(result.is_err());
        prop_assert!(result.is_err_and(|e: GroupSessionError| e.is_fatal()));
        prop_assert_eq!(inbound.latest_index(), 0);
    }
}
