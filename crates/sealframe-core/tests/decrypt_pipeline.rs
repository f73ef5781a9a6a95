//! Group decryption end to end
//!
//! Verifies the pipeline's guarantees against real group sessions:
//! - a message index is accepted for one event only (retries of that event
//!   are fine)
//! - routing metadata comes from the outer envelope, never the plaintext
//! - unknown inner event types pass through with raw content
//! - concurrent decryption of one session admits exactly one claimant per
//!   index and never loses ratchet progress

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use proptest::prelude::*;
use sealframe_core::{
    CryptoStore, DecryptionError, Event, EventType, GroupDecryptor, Machine, MemoryStore,
    RedbStore, RoomId, SenderKey, SessionId, UserId, event::MEGOLM_ALGORITHM,
};
use sealframe_crypto::{MAX_SKIP, OutboundGroupSession};
use serde_json::{Value, json};
use tempfile::tempdir;

const ROOM: &str = "!room:example.org";
const SENDER: &str = "@bob:example.org";
const SENDER_KEY: &str = "bob-curve";

/// Sender side of one group session whose inbound half is in `store`.
fn share_session(store: &impl CryptoStore, seed: u8) -> OutboundGroupSession {
    let outbound = OutboundGroupSession::new(&[seed; 32], [seed; 32]);
    let inbound = outbound.inbound_session();
    store
        .put_group_session(
            &RoomId::new(ROOM),
            &SenderKey::new(SENDER_KEY),
            &SessionId::new(inbound.session_id()),
            &inbound,
        )
        .unwrap();
    outbound
}

fn encrypt(outbound: &mut OutboundGroupSession, plaintext: &Value) -> String {
    let bytes = outbound.encrypt(plaintext.to_string().as_bytes(), [7u8; 20]).unwrap();
    STANDARD_NO_PAD.encode(bytes)
}

fn envelope(session_id: &str, ciphertext: &str, event_id: &str, ts: u64) -> Event {
    Event::from_json(
        &json!({
            "sender": SENDER,
            "type": "m.room.encrypted",
            "origin_server_ts": ts,
            "event_id": event_id,
            "room_id": ROOM,
            "content": {
                "algorithm": MEGOLM_ALGORITHM,
                "sender_key": SENDER_KEY,
                "session_id": session_id,
                "ciphertext": ciphertext,
                "device_id": "BOBDEVICE"
            },
            "unsigned": { "age": 42, "transaction_id": "txn1" }
        })
        .to_string(),
    )
    .unwrap()
}

fn message(body: &str) -> Value {
    json!({ "type": "m.room.message", "content": { "msgtype": "m.text", "body": body } })
}

#[test]
fn same_index_accepted_for_one_event_only() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 1);
    let session_id = outbound.session_id();
    let decryptor = GroupDecryptor::new(store);

    let ciphertext = encrypt(&mut outbound, &message("hello"));
    let original = envelope(&session_id, &ciphertext, "$original", 1_000);

    let decrypted = decryptor.decrypt_megolm_event(&original).unwrap();
    assert_eq!(decrypted.content.raw()["body"], "hello");

    // Retry of the identical envelope
    assert!(decryptor.decrypt_megolm_event(&original).is_ok());

    // Same ciphertext under another event ID
    let replay = envelope(&session_id, &ciphertext, "$replay", 1_000);
    let err = decryptor.decrypt_megolm_event(&replay).unwrap_err();
    assert!(err.is_replay());
    assert!(matches!(err, DecryptionError::DuplicateMessageIndex { message_index: 0 }));

    // Same event ID with a different timestamp is also a different claim
    let restamped = envelope(&session_id, &ciphertext, "$original", 2_000);
    assert!(decryptor.decrypt_megolm_event(&restamped).unwrap_err().is_replay());
}

#[test]
fn replay_rejection_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crypto.redb");

    let (session_id, ciphertext) = {
        let store = RedbStore::open(&path).unwrap();
        let mut outbound = share_session(&store, 2);
        let ciphertext = encrypt(&mut outbound, &message("persisted"));
        let machine = Machine::new(store, UserId::new("@me:example.org"));

        let event = envelope(&outbound.session_id(), &ciphertext, "$first", 10);
        machine.decrypt_megolm_event(&event).unwrap();
        (outbound.session_id(), ciphertext)
    };

    let machine = Machine::new(RedbStore::open(&path).unwrap(), UserId::new("@me:example.org"));
    let replay = envelope(&session_id, &ciphertext, "$second", 10);
    assert!(machine.decrypt_megolm_event(&replay).unwrap_err().is_replay());

    let retry = envelope(&session_id, &ciphertext, "$first", 10);
    assert!(machine.decrypt_megolm_event(&retry).is_ok());
}

#[test]
fn unknown_inner_type_passes_through() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 3);
    let decryptor = GroupDecryptor::new(store);

    let inner = json!({
        "type": "org.example.poll.start",
        "content": { "question": "lunch?", "answers": ["yes", "no"] }
    });
    let ciphertext = encrypt(&mut outbound, &inner);
    let event = envelope(&outbound.session_id(), &ciphertext, "$poll", 5);

    let decrypted = decryptor.decrypt_megolm_event(&event).unwrap();
    assert_eq!(decrypted.event_type.as_str(), "org.example.poll.start");
    assert!(decrypted.content.parsed().is_none());
    assert_eq!(decrypted.content.raw(), &inner["content"]);
}

#[test]
fn malformed_known_inner_type_is_content_error() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 4);
    let decryptor = GroupDecryptor::new(store);

    let inner = json!({ "type": EventType::ROOM_MESSAGE, "content": { "msgtype": 7 } });
    let ciphertext = encrypt(&mut outbound, &inner);
    let event = envelope(&outbound.session_id(), &ciphertext, "$bad", 5);

    assert!(matches!(
        decryptor.decrypt_megolm_event(&event),
        Err(DecryptionError::ContentParse(_))
    ));
}

#[test]
fn tampered_ciphertext_is_rejected_without_claiming_index() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 5);
    let session_id = outbound.session_id();
    let decryptor = GroupDecryptor::new(store.clone());

    let mut bytes = STANDARD_NO_PAD
        .decode(encrypt(&mut outbound, &message("tamper me")))
        .unwrap();
    bytes[40] ^= 0x01;
    let tampered = envelope(&session_id, &STANDARD_NO_PAD.encode(&bytes), "$t", 1);

    let err = decryptor.decrypt_megolm_event(&tampered).unwrap_err();
    assert!(matches!(err, DecryptionError::Decrypt(_)));
    assert!(!err.needs_new_session());
    assert_eq!(store.claim_count().unwrap(), 0);
}

#[test]
fn index_before_first_known_needs_new_session() {
    let store = MemoryStore::new();
    let mut outbound = OutboundGroupSession::new(&[6; 32], [6; 32]);
    let early = encrypt(&mut outbound, &message("before share"));

    // Share only from index 1 onwards
    let inbound = outbound.inbound_session();
    store
        .put_group_session(
            &RoomId::new(ROOM),
            &SenderKey::new(SENDER_KEY),
            &SessionId::new(inbound.session_id()),
            &inbound,
        )
        .unwrap();

    let decryptor = GroupDecryptor::new(store);
    let err = decryptor
        .decrypt_megolm_event(&envelope(&outbound.session_id(), &early, "$early", 1))
        .unwrap_err();
    assert!(err.needs_new_session());
    assert!(matches!(err, DecryptionError::Decrypt(_)));
}

#[test]
fn held_back_message_decrypts_after_long_session() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 7);
    let session_id = outbound.session_id();
    let decryptor = GroupDecryptor::new(store.clone());

    // Keep three envelopes from a session that runs past MAX_SKIP
    let (early, held_back, recent) = (MAX_SKIP / 2, MAX_SKIP + 5, MAX_SKIP + MAX_SKIP / 2);
    let mut kept = Vec::new();
    for index in 0..=recent {
        let ciphertext = encrypt(&mut outbound, &message(&format!("m{index}")));
        if [early, held_back, recent].contains(&index) {
            kept.push(envelope(&session_id, &ciphertext, &format!("$m{index}"), u64::from(index)));
        }
    }

    decryptor.decrypt_megolm_event(&kept[0]).unwrap();
    decryptor.decrypt_megolm_event(&kept[2]).unwrap();

    let late = decryptor.decrypt_megolm_event(&kept[1]).unwrap();
    assert_eq!(late.content.raw()["body"], format!("m{held_back}"));

    let stored = store
        .group_session(&RoomId::new(ROOM), &SenderKey::new(SENDER_KEY), &SessionId::new(session_id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.latest_index(), recent + 1);
}

#[test]
fn concurrent_claims_admit_exactly_one_event() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 8);
    let session_id = outbound.session_id();
    let ciphertext = encrypt(&mut outbound, &message("contested"));
    let decryptor = GroupDecryptor::new(store);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let event = envelope(&session_id, &ciphertext, &format!("$claim{i}"), 99);
                let decryptor = &decryptor;
                scope.spawn(move || decryptor.decrypt_megolm_event(&event))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(DecryptionError::is_replay));
}

#[test]
fn concurrent_decryption_keeps_ratchet_progress() {
    let store = MemoryStore::new();
    let mut outbound = share_session(&store, 9);
    let session_id = outbound.session_id();
    let events: Vec<_> = (0..32)
        .map(|i| {
            let ciphertext = encrypt(&mut outbound, &message(&format!("m{i}")));
            envelope(&session_id, &ciphertext, &format!("$e{i}"), i)
        })
        .collect();
    let decryptor = GroupDecryptor::new(store.clone());

    std::thread::scope(|scope| {
        for chunk in events.chunks(8) {
            let decryptor = &decryptor;
            scope.spawn(move || {
                for event in chunk.iter().rev() {
                    decryptor.decrypt_megolm_event(event).unwrap();
                }
            });
        }
    });

    let session = store
        .group_session(&RoomId::new(ROOM), &SenderKey::new(SENDER_KEY), &SessionId::new(session_id))
        .unwrap()
        .unwrap();
    assert_eq!(session.latest_index(), 32);
    assert_eq!(store.claim_count().unwrap(), 32);
}

#[test]
fn prop_outer_metadata_wins() {
    proptest!(|(
        forged_sender in "@[a-z]{1,8}:evil\\.example",
        forged_room in "![a-z]{1,8}:evil\\.example",
        forged_id in "\\$[a-z0-9]{1,12}",
        forged_ts in any::<u64>(),
        ts in any::<u64>(),
    )| {
        let store = MemoryStore::new();
        let mut outbound = share_session(&store, 10);
        let decryptor = GroupDecryptor::new(store);

        let inner = json!({
            "type": "m.room.message",
            "sender": forged_sender,
            "room_id": forged_room,
            "event_id": forged_id,
            "origin_server_ts": forged_ts,
            "unsigned": { "forged": true },
            "content": { "msgtype": "m.text", "body": "hi" }
        });
        let ciphertext = encrypt(&mut outbound, &inner);
        let outer = envelope(&outbound.session_id(), &ciphertext, "$outer", ts);

        let decrypted = decryptor.decrypt_megolm_event(&outer).unwrap();
        prop_assert_eq!(&decrypted.sender, &outer.sender);
        prop_assert_eq!(&decrypted.room_id, &outer.room_id);
        prop_assert_eq!(&decrypted.event_id, &outer.event_id);
        prop_assert_eq!(decrypted.origin_server_ts, ts);
        prop_assert_eq!(&decrypted.unsigned, &outer.unsigned);
        prop_assert_eq!(decrypted.event_type.as_str(), EventType::ROOM_MESSAGE);
    });
}

#[test]
fn prop_replays_rejected_in_any_order() {
    proptest!(|(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
        replay_of in 0..8usize,
    )| {
        let store = MemoryStore::new();
        let mut outbound = share_session(&store, 11);
        let session_id = outbound.session_id();
        let ciphertexts: Vec<_> =
            (0..8).map(|i| encrypt(&mut outbound, &message(&format!("m{i}")))).collect();
        let decryptor = GroupDecryptor::new(store);

        for &i in &order {
            let event = envelope(&session_id, &ciphertexts[i], &format!("$e{i}"), 1);
            let decrypted = decryptor.decrypt_megolm_event(&event).unwrap();
            prop_assert_eq!(&decrypted.content.raw()["body"], &json!(format!("m{i}")));
        }

        let replay = envelope(&session_id, &ciphertexts[replay_of], "$replay", 1);
        let err = decryptor.decrypt_megolm_event(&replay).unwrap_err();
        prop_assert!(err.is_replay());
    });
}
