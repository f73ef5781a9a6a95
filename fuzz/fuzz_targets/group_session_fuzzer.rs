//! Fuzz target for inbound group session decryption
//!
//! Feeds mutated group messages and session records to
//! `InboundGroupSession`.
//!
//! # Strategy
//!
//! - Encrypt a batch of genuine messages at arbitrary nonces
//! - Decrypt them in arbitrary order, some with single-byte corruption
//! - Restore the session from persisted bytes mid-stream
//! - Decode arbitrary session records
//!
//! # Invariants
//!
//! - Decryption never panics
//! - Every genuine message decrypts to its plaintext and index, in any
//!   order and any number of times
//! - A corrupted message fails with a fatal error and leaves the session's
//!   bytes unchanged
//! - A restored session behaves exactly like the original

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealframe_crypto::{InboundGroupSession, NONCE_RANDOM_SIZE, OutboundGroupSession};

#[derive(Debug, Clone, Arbitrary)]
struct SessionScenario {
    session_secret: Vec<u8>,
    signing_seed: [u8; 32],
    /// Messages to encrypt (capped)
    messages: Vec<(Vec<u8>, [u8; NONCE_RANDOM_SIZE])>,
    operations: Vec<Operation>,
    /// Arbitrary bytes fed to the session record decoder
    record: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Decrypt { message: u8 },
    DecryptCorrupted { message: u8, offset: u16, xor: u8 },
    DecryptTruncated { message: u8, len: u16 },
    Restore,
}

fuzz_target!(|scenario: SessionScenario| {
    let _ = InboundGroupSession::from_bytes(&scenario.record);

    let mut outbound = OutboundGroupSession::new(&scenario.session_secret, scenario.signing_seed);
    let mut inbound = outbound.inbound_session();

    let mut sent = Vec::new();
    for (plaintext, random) in scenario.messages.into_iter().take(32) {
        let Ok(bytes) = outbound.encrypt(&plaintext, random) else {
            return;
        };
        sent.push((plaintext, bytes));
    }
    if sent.is_empty() {
        return;
    }

    for op in scenario.operations {
        match op {
            Operation::Decrypt { message } => {
                let index = message as usize % sent.len();
                let (plaintext, bytes) = &sent[index];

                // INVARIANT: genuine messages always decrypt
                let decrypted = inbound.decrypt(bytes).expect("genuine message must decrypt");
                assert_eq!(&decrypted.plaintext, plaintext);
                assert_eq!(decrypted.message_index as usize, index);
            },
            Operation::DecryptCorrupted { message, offset, xor } => {
                if xor == 0 {
                    continue;
                }
                let (_, bytes) = &sent[message as usize % sent.len()];
                let mut corrupted = bytes.clone();
                let offset = offset as usize % corrupted.len();
                corrupted[offset] ^= xor;

                // INVARIANT: tampering is fatal and moves nothing
                let before = inbound.to_bytes();
                let err = inbound.decrypt(&corrupted).expect_err("corrupted message must fail");
                assert!(err.is_fatal(), "tampering must be fatal: {err:?}");
                assert_eq!(before, inbound.to_bytes());
            },
            Operation::DecryptTruncated { message, len } => {
                let (_, bytes) = &sent[message as usize % sent.len()];
                let len = len as usize % bytes.len();

                let before = inbound.to_bytes();
                assert!(inbound.decrypt(&bytes[..len]).is_err());
                assert_eq!(before, inbound.to_bytes());
            },
            Operation::Restore => {
                // INVARIANT: persistence is lossless
                let bytes = inbound.to_bytes();
                inbound = InboundGroupSession::from_bytes(&bytes).expect("own record must decode");
                assert_eq!(bytes, inbound.to_bytes());
            },
        }
    }
});
