//! Fuzz target for the group decryption pipeline
//!
//! Drives `GroupDecryptor` with genuine, replayed and hostile envelopes over
//! a fault-injecting store.
//!
//! # Invariants
//!
//! - Never panics, whatever the envelope JSON or plaintext
//! - A message index is accepted for at most one (event ID, timestamp)
//! - Decrypted events carry the outer envelope's routing metadata
//! - Injected store failures surface only as store-failure variants

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use libfuzzer_sys::fuzz_target;
use sealframe_core::{
    ChaoticStore, CryptoStore, DecryptionError, Event, GroupDecryptor, MemoryStore, RoomId,
    SenderKey, SessionId, event::MEGOLM_ALGORITHM,
};
use sealframe_crypto::OutboundGroupSession;
use serde_json::json;

const ROOM: &str = "!fuzz:example.org";
const SENDER_KEY: &str = "curve";

#[derive(Debug, Clone, Arbitrary)]
struct PipelineScenario {
    failure_rate: u8,
    seed: u64,
    /// Message bodies encrypted with the shared session (capped)
    bodies: Vec<Vec<u8>>,
    envelopes: Vec<Envelope>,
    /// Arbitrary bytes parsed as an event and decrypted
    raw_event: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
struct Envelope {
    message: u8,
    event_id: u8,
    timestamp: u8,
}

fuzz_target!(|scenario: PipelineScenario| {
    let inner = MemoryStore::new();
    let mut outbound = OutboundGroupSession::new(b"fuzz", [0x5A; 32]);
    let inbound = outbound.inbound_session();
    let session_id = outbound.session_id();
    inner
        .put_group_session(
            &RoomId::new(ROOM),
            &SenderKey::new(SENDER_KEY),
            &SessionId::new(session_id.clone()),
            &inbound,
        )
        .expect("memory store is infallible");

    let rate = f64::from(scenario.failure_rate) / f64::from(u8::MAX) * 0.5;
    let decryptor = GroupDecryptor::new(ChaoticStore::with_seed(inner, rate, scenario.seed));

    if let Ok(json) = std::str::from_utf8(&scenario.raw_event) {
        if let Ok(event) = Event::from_json(json) {
            let _ = decryptor.decrypt_megolm_event(&event);
        }
    }

    let ciphertexts: Vec<_> = scenario
        .bodies
        .iter()
        .take(16)
        .map(|body| {
            json!({
                "type": "m.room.message",
                "content": { "msgtype": "m.text", "body": String::from_utf8_lossy(body) }
            })
            .to_string()
        })
        .filter_map(|plaintext| outbound.encrypt(plaintext.as_bytes(), [0u8; 20]).ok())
        .map(|bytes| STANDARD_NO_PAD.encode(bytes))
        .collect();
    if ciphertexts.is_empty() {
        return;
    }

    let mut claims: HashMap<usize, (u8, u8)> = HashMap::new();

    for envelope in scenario.envelopes {
        let message = envelope.message as usize % ciphertexts.len();
        let event = Event::from_json(
            &json!({
                "sender": "@bob:example.org",
                "type": "m.room.encrypted",
                "origin_server_ts": envelope.timestamp,
                "event_id": format!("$e{}", envelope.event_id),
                "room_id": ROOM,
                "content": {
                    "algorithm": MEGOLM_ALGORITHM,
                    "sender_key": SENDER_KEY,
                    "session_id": session_id,
                    "ciphertext": ciphertexts[message],
                }
            })
            .to_string(),
        )
        .expect("well-formed envelope");

        match decryptor.decrypt_megolm_event(&event) {
            Ok(decrypted) => {
                // INVARIANT: one claimant per index
                let claimant = (envelope.event_id, envelope.timestamp);
                let first = *claims.entry(message).or_insert(claimant);
                assert_eq!(first, claimant, "index {message} accepted twice");

                // INVARIANT: outer metadata wins
                assert_eq!(decrypted.event_id, event.event_id);
                assert_eq!(decrypted.sender, event.sender);
                assert_eq!(decrypted.room_id, event.room_id);
                assert_eq!(decrypted.origin_server_ts, event.origin_server_ts);
            },
            Err(DecryptionError::DuplicateMessageIndex { message_index }) => {
                let claimant = (envelope.event_id, envelope.timestamp);
                assert_ne!(claims.get(&(message_index as usize)), Some(&claimant));
            },
            Err(
                DecryptionError::SessionLookup(_)
                | DecryptionError::SessionUpdate(_)
                | DecryptionError::IndexValidation(_),
            ) => {},
            Err(e) => panic!("unexpected error for genuine envelope: {e}"),
        }
    }
});
