use rootless_core::{
    verify_cid, ContentInput, ContentObject, DoubleRatchet, Error, Identity, IdentityOptions,
    PayloadEncryption, Recipient, SendOptions, SessionConfig, SessionManager,
};

/// The fixed seed used across scenarios: bytes 1..=32.
fn seed_a() -> [u8; 32] {
    core::array::from_fn(|i| (i + 1) as u8)
}

/// The second identity's seed: each byte incremented by one.
fn seed_b() -> [u8; 32] {
    core::array::from_fn(|i| (i + 2) as u8)
}

fn identity_from(seed: [u8; 32]) -> Identity {
    Identity::create(IdentityOptions {
        seed: Some(seed),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn s1_identity_determinism() {
    let first = identity_from(seed_a());
    let second = identity_from(seed_a());

    assert_eq!(first.did().to_string(), second.did().to_string());
    assert!(first.document().verify().valid);
    assert!(second.document().verify().valid);
}

#[test]
fn s2_content_roundtrip() {
    let author = identity_from(seed_a());

    let object = ContentObject::create(
        b"Hello, RootlessNet!",
        ContentInput {
            zone: "public".to_string(),
            content_type: "text/plain".to_string(),
            ..Default::default()
        },
        &author,
    )
    .unwrap();

    let report = object.verify(None);
    assert!(report.valid, "unexpected errors: {:?}", report.errors);

    assert_eq!(
        object.payload_hash,
        rootless_core::crypto::hash::digest(b"Hello, RootlessNet!")
    );

    // The id recomputes to the same CID over the signed bytes.
    let id = object.id.as_deref().unwrap();
    assert!(verify_cid(id, object.cid_bytes().unwrap()));

    assert_eq!(object.read_text(None).unwrap(), "Hello, RootlessNet!");
}

#[test]
fn s3_multi_recipient_closure() {
    let alice = identity_from(seed_a());
    let bob = identity_from(seed_b());
    let carol = Identity::create(IdentityOptions::default()).unwrap();

    let object = ContentObject::create(
        b"for B only",
        ContentInput {
            zone: "public".to_string(),
            content_type: "text/plain".to_string(),
            encryption: PayloadEncryption::Recipients,
            recipients: vec![Recipient::for_identity(&bob)],
            ..Default::default()
        },
        &alice,
    )
    .unwrap();

    assert_eq!(object.decrypt(&bob).unwrap(), b"for B only");
    assert_eq!(object.decrypt(&carol), Err(Error::NotRecipient));

    // Flipping one ciphertext byte turns B's decryption into an
    // authentication failure.
    let mut tampered = object.clone();
    if let rootless_core::Payload::Recipients { ciphertext, .. } = &mut tampered.payload {
        ciphertext[0] ^= 1;
    } else {
        panic!("expected a recipients payload");
    }
    assert_eq!(tampered.decrypt(&bob), Err(Error::Authentication));
}

fn session_pair() -> (SessionManager, SessionManager, String) {
    let alice = identity_from(seed_a());
    let bob = identity_from(seed_b());

    let mut alice_sessions = SessionManager::new(
        alice,
        SessionConfig {
            one_time_prekey_count: 5,
            ..Default::default()
        },
    )
    .unwrap();
    let mut bob_sessions = SessionManager::new(
        bob,
        SessionConfig {
            one_time_prekey_count: 5,
            ..Default::default()
        },
    )
    .unwrap();

    // B publishes a bundle with one signed prekey and five one-time
    // prekeys; A fetches it and initiates.
    let bundle = bob_sessions.publish_bundle();
    assert_eq!(bundle.one_time_prekeys.len(), 5);

    let conversation_id = alice_sessions
        .initiate(
            &bob_sessions.identity().did().to_string(),
            &bundle,
            &bob_sessions.identity().signing_public(),
        )
        .unwrap();

    let handshake = alice_sessions
        .conversation(&conversation_id)
        .unwrap()
        .handshake_keys()
        .unwrap()
        .clone();

    let accepted_id = bob_sessions
        .accept(
            &alice_sessions.identity().did().to_string(),
            &alice_sessions.identity().encryption_public(),
            &handshake.ephemeral_public,
            handshake.signed_prekey_id,
            handshake.one_time_prekey_id,
        )
        .unwrap();
    assert_eq!(conversation_id, accepted_id);

    (alice_sessions, bob_sessions, conversation_id)
}

#[test]
fn s4_x3dh_handshake_and_first_message() {
    let (mut alice, mut bob, conversation_id) = session_pair();

    let message = alice
        .send(&conversation_id, b"hi", SendOptions::default())
        .unwrap();
    assert_eq!(bob.receive(&message).unwrap(), b"hi");

    // The consumed one-time prekey is gone from the republished bundle,
    // and a second accept with the same ids fails.
    assert_eq!(bob.publish_bundle().one_time_prekeys.len(), 4);

    let handshake = alice
        .conversation(&conversation_id)
        .unwrap()
        .handshake_keys()
        .unwrap()
        .clone();
    let replay = bob.accept(
        &alice.identity().did().to_string(),
        &alice.identity().encryption_public(),
        &handshake.ephemeral_public,
        handshake.signed_prekey_id,
        handshake.one_time_prekey_id,
    );
    assert_eq!(
        replay.unwrap_err(),
        Error::UnknownOneTimePrekey(handshake.one_time_prekey_id.unwrap())
    );
}

#[test]
fn s5_out_of_order_within_window() {
    let (mut alice, mut bob, conversation_id) = session_pair();

    let messages: Vec<_> = (0..4)
        .map(|i| {
            alice
                .send(&conversation_id, format!("m{i}").as_bytes(), SendOptions::default())
                .unwrap()
        })
        .collect();

    // Arrival order: m2, m0, m3, m1.
    assert_eq!(bob.receive(&messages[2]).unwrap(), b"m2");
    assert_eq!(bob.receive(&messages[0]).unwrap(), b"m0");
    assert_eq!(bob.receive(&messages[3]).unwrap(), b"m3");
    assert_eq!(bob.receive(&messages[1]).unwrap(), b"m1");
}

#[test]
fn s5_losing_more_than_the_window_is_fatal() {
    let (mut alice, mut bob, conversation_id) = session_pair();

    // Lose 1001 messages, then deliver the next one: the receiver would
    // need 1001 skips against a window of 1000.
    for _ in 0..1001 {
        alice
            .send(&conversation_id, b"lost", SendOptions::default())
            .unwrap();
    }
    let late = alice
        .send(&conversation_id, b"too late", SendOptions::default())
        .unwrap();

    assert!(matches!(
        bob.receive(&late).unwrap_err(),
        Error::TooManySkipped { max: 1000, .. }
    ));
}

#[test]
fn s6_dh_ratchet_step_counters() {
    let (mut alice, mut bob, conversation_id) = session_pair();

    // A→B on chain 0.
    for i in 0..2 {
        let message = alice
            .send(&conversation_id, format!("a{i}").as_bytes(), SendOptions::default())
            .unwrap();
        assert_eq!(message.encrypted.header.n, i);
        bob.receive(&message).unwrap();
    }

    // B's first reply opens B's chain at zero.
    let reply = bob
        .send(&conversation_id, b"first reply", SendOptions::default())
        .unwrap();
    assert_eq!(reply.encrypted.header.n, 0);
    let reply_dh = reply.encrypted.header.dh_public;
    assert_eq!(alice.receive(&reply).unwrap(), b"first reply");

    // A observed a new dhPublic, ratcheted, and sends on a fresh chain:
    // counters reset, previousSendN reports the closed chain's length.
    let next = alice
        .send(&conversation_id, b"post step", SendOptions::default())
        .unwrap();
    assert_ne!(next.encrypted.header.dh_public, reply_dh);
    assert_eq!(next.encrypted.header.n, 0);
    assert_eq!(next.encrypted.header.pn, 2);
    assert_eq!(bob.receive(&next).unwrap(), b"post step");
}

#[test]
fn s7_export_import() {
    let alice = identity_from(seed_a());

    let exported = alice.export("correct horse").unwrap();
    let imported = Identity::import(&exported, "correct horse").unwrap();
    assert_eq!(imported.did().to_string(), alice.did().to_string());

    assert_eq!(
        Identity::import(&exported, "staple").unwrap_err(),
        Error::Authentication
    );
}

#[test]
fn s8_sealed_message_carries_no_sender() {
    let alice = identity_from(seed_a());
    let bob = identity_from(seed_b());

    let alice_sessions = SessionManager::new(alice, SessionConfig::default()).unwrap();
    let bob_sessions = SessionManager::new(bob, SessionConfig::default()).unwrap();

    let sealed = alice_sessions
        .sealed_send(&bob_sessions.identity().encryption_public(), b"anon")
        .unwrap();

    // The wire form reveals only an ephemeral key and ciphertext.
    let wire = String::from_utf8(rootless_core::canonical::to_bytes(&sealed).unwrap()).unwrap();
    assert!(!wire.contains(&alice_sessions.identity().did().to_string()));
    assert!(!wire.contains("sender"));

    assert_eq!(bob_sessions.sealed_receive(&sealed).unwrap(), b"anon");
}

#[test]
fn ratchet_round_trip_survives_serialization_between_turns() {
    let (mut alice, mut bob, conversation_id) = session_pair();

    let m0 = alice
        .send(&conversation_id, b"turn 0", SendOptions::default())
        .unwrap();
    bob.receive(&m0).unwrap();

    // Persist Bob mid-conversation and continue from the restored state.
    let state = bob.export_state().unwrap();
    let identity_envelope = bob.identity().export("pw").unwrap();
    let restored_identity = Identity::import(&identity_envelope, "pw").unwrap();
    let mut restored_bob = SessionManager::import_state(
        restored_identity,
        &state,
        SessionConfig {
            one_time_prekey_count: 5,
            ..Default::default()
        },
    )
    .unwrap();

    let reply = restored_bob
        .send(&conversation_id, b"turn 1", SendOptions::default())
        .unwrap();
    assert_eq!(alice.receive(&reply).unwrap(), b"turn 1");

    let m2 = alice
        .send(&conversation_id, b"turn 2", SendOptions::default())
        .unwrap();
    assert_eq!(restored_bob.receive(&m2).unwrap(), b"turn 2");
}

#[test]
fn standalone_ratchet_matches_session_behavior() {
    // The ratchet is usable on its own: drive one from each side of a raw
    // X3DH agreement.
    let alice = identity_from(seed_a());
    let bob = identity_from(seed_b());

    let bob_prekeys = rootless_core::PrekeySet::generate(bob.key_set(), 1).unwrap();
    let bundle = bob_prekeys.bundle(bob.key_set());

    let initiation =
        rootless_core::x3dh_initiate(alice.key_set(), &bundle, &bob.signing_public()).unwrap();

    let mut bob_prekeys = bob_prekeys;
    let bob_secret = rootless_core::x3dh_respond(
        bob.key_set(),
        &mut bob_prekeys,
        &alice.encryption_public(),
        &initiation.ephemeral_public,
        initiation.used_signed_prekey_id,
        initiation.used_one_time_prekey_id,
    )
    .unwrap();

    let spk_pair = bob_prekeys.signed_prekey().public_key();
    let mut alice_ratchet = DoubleRatchet::initialize_for_sender(
        initiation.shared_secret,
        &spk_pair,
        rootless_core::DEFAULT_MAX_SKIP,
    )
    .unwrap();

    let mut bob_ratchet = rootless_core::DoubleRatchet::initialize_for_receiver(
        bob_secret,
        bob_prekeys.signed_prekey().key_pair(),
        rootless_core::DEFAULT_MAX_SKIP,
    );

    let message = alice_ratchet.encrypt(b"raw layers").unwrap();
    assert_eq!(bob_ratchet.decrypt(&message).unwrap(), b"raw layers");
}
