//! Chaos property tests for the decryption pipeline
//!
//! Wraps the store in `ChaoticStore` and checks that injected failures:
//! - surface as the store-failure variants of `DecryptionError`, never as
//!   replays or missing sessions
//! - never leave a half-recorded claim or a regressed session behind, so
//!   every envelope still decrypts once the store is healthy again

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use proptest::prelude::*;
use sealframe_core::{
    ChaoticStore, CryptoStore, DecryptionError, Event, GroupDecryptor, MemoryStore, RedbStore,
    RoomId, SenderKey, SessionId, event::MEGOLM_ALGORITHM,
};
use sealframe_crypto::OutboundGroupSession;
use serde_json::json;
use tempfile::tempdir;

const ROOM: &str = "!chaos:example.org";
const SENDER_KEY: &str = "curve";

fn session_key() -> (RoomId, SenderKey) {
    (RoomId::new(ROOM), SenderKey::new(SENDER_KEY))
}

/// Share a session into `store` and encrypt `count` envelopes with it.
fn envelopes(store: &impl CryptoStore, count: usize) -> (SessionId, Vec<Event>) {
    let mut outbound = OutboundGroupSession::new(b"chaos", [0x42; 32]);
    let inbound = outbound.inbound_session();
    let session_id = SessionId::new(inbound.session_id());
    let (room, sender_key) = session_key();
    store.put_group_session(&room, &sender_key, &session_id, &inbound).unwrap();

    let events = (0..count)
        .map(|i| {
            let plaintext = json!({ "type": "m.room.message", "content": { "msgtype": "m.text", "body": i } });
            let bytes = outbound.encrypt(plaintext.to_string().as_bytes(), [i as u8; 20]).unwrap();
            Event::from_json(
                &json!({
                    "sender": "@bob:example.org",
                    "type": "m.room.encrypted",
                    "origin_server_ts": 1_000 + i as u64,
                    "event_id": format!("$event{i}"),
                    "room_id": ROOM,
                    "content": {
                        "algorithm": MEGOLM_ALGORITHM,
                        "sender_key": SENDER_KEY,
                        "session_id": session_id.as_str(),
                        "ciphertext": STANDARD_NO_PAD.encode(bytes),
                    }
                })
                .to_string(),
            )
            .unwrap()
        })
        .collect();

    (session_id, events)
}

fn is_store_failure(err: &DecryptionError) -> bool {
    matches!(
        err,
        DecryptionError::SessionLookup(_)
            | DecryptionError::SessionUpdate(_)
            | DecryptionError::IndexValidation(_)
    )
}

fn run_chaos<S: CryptoStore>(inner: S, failure_rate: f64, seed: u64, order: &[usize]) -> Result<(), TestCaseError> {
    let (session_id, events) = envelopes(&inner, order.len());
    let chaotic = ChaoticStore::with_seed(inner.clone(), failure_rate, seed);
    let decryptor = GroupDecryptor::new(chaotic);

    for &i in order {
        match decryptor.decrypt_megolm_event(&events[i]) {
            Ok(event) => prop_assert_eq!(&event.content.raw()["body"], &json!(i)),
            Err(e) => prop_assert!(is_store_failure(&e), "unexpected error: {e}"),
        }
    }

    // ORACLE: a healthy store decrypts everything, each claim belongs to its
    // own event, and the stored ratchet never moved backwards
    let healthy = GroupDecryptor::new(inner.clone());
    for (i, event) in events.iter().enumerate() {
        let decrypted = healthy.decrypt_megolm_event(event);
        prop_assert!(decrypted.is_ok(), "event {i} failed after chaos: {:?}", decrypted.err());
    }

    let (room, sender_key) = session_key();
    let session = inner.group_session(&room, &sender_key, &session_id).unwrap().unwrap();
    prop_assert!(session.latest_index() as usize <= events.len());

    Ok(())
}

#[test]
fn prop_memory_store_chaos() {
    proptest!(|(
        failure_rate in 0.0..0.9f64,
        seed in any::<u64>(),
        order in Just((0..24usize).collect::<Vec<_>>()).prop_shuffle(),
    )| {
        run_chaos(MemoryStore::new(), failure_rate, seed, &order)?;
    });
}

#[test]
fn prop_redb_store_chaos() {
    proptest!(ProptestConfig::with_cases(16), |(
        failure_rate in 0.0..0.9f64,
        seed in any::<u64>(),
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
    )| {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("chaos.redb")).unwrap();
        run_chaos(store, failure_rate, seed, &order)?;
    });
}

#[test]
fn always_failing_store_reports_lookup_failure() {
    let inner = MemoryStore::new();
    let (_, events) = envelopes(&inner, 1);
    let decryptor = GroupDecryptor::new(ChaoticStore::always_failing(inner.clone()));

    let err = decryptor.decrypt_megolm_event(&events[0]).unwrap_err();
    assert!(matches!(err, DecryptionError::SessionLookup(_)));
    assert!(!err.needs_new_session());
    assert_eq!(inner.claim_count().unwrap(), 0);
}
