// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for session::handshake and prekey consumption

mod common;

use common::*;
use parley_core::crypto::derive_keys;
use parley_core::session::{
    initialize_initiator_session, initialize_responder_session, initiator_secret,
    responder_secret, InitiatorParameters, ResponderParameters,
};
use parley_core::*;

struct Keys {
    alice: IdentityKeyPair,
    bob: IdentityKeyPair,
    signed: KeyPair,
    one_time: KeyPair,
    base: KeyPair,
}

fn keys() -> Keys {
    Keys {
        alice: generate_identity_key_pair(),
        bob: generate_identity_key_pair(),
        signed: KeyPair::generate(),
        one_time: KeyPair::generate(),
        base: KeyPair::generate(),
    }
}

fn initiator(k: &Keys, with_one_time: bool) -> InitiatorParameters<'_> {
    InitiatorParameters {
        our_identity: &k.alice,
        our_base_key: k.base.clone(),
        their_identity: k.bob.identity_key(),
        their_signed_pre_key: *k.signed.public_key(),
        their_one_time_pre_key: with_one_time.then(|| *k.one_time.public_key()),
    }
}

fn responder(k: &Keys, with_one_time: bool) -> ResponderParameters<'_> {
    ResponderParameters {
        our_identity: &k.bob,
        our_signed_pre_key: &k.signed,
        our_one_time_pre_key: with_one_time.then_some(&k.one_time),
        their_identity: k.alice.identity_key(),
        their_base_key: *k.base.public_key(),
    }
}

// ============================================================
// Shared Secret
// ============================================================

#[test]
fn test_secrets_match_with_one_time_pre_key() {
    let k = keys();

    let ours = initiator_secret(&initiator(&k, true)).unwrap();
    let theirs = responder_secret(&responder(&k, true)).unwrap();

    assert_eq!(ours.len(), 128);
    assert_eq!(*ours, *theirs);
}

#[test]
fn test_secrets_match_without_one_time_pre_key() {
    let k = keys();

    let ours = initiator_secret(&initiator(&k, false)).unwrap();
    let theirs = responder_secret(&responder(&k, false)).unwrap();

    assert_eq!(ours.len(), 96);
    assert_eq!(*ours, *theirs);
}

#[test]
fn test_one_time_pre_key_mismatch_diverges() {
    let k = keys();

    let ours = initiator_secret(&initiator(&k, true)).unwrap();
    let theirs = responder_secret(&responder(&k, false)).unwrap();

    assert_ne!(*ours, *theirs);
}

#[test]
fn test_concatenation_order_matters() {
    let k = keys();
    let secret = initiator_secret(&initiator(&k, false)).unwrap();

    // swap the first two agreements
    let mut reordered = Vec::with_capacity(secret.len());
    reordered.extend_from_slice(&secret[32..64]);
    reordered.extend_from_slice(&secret[..32]);
    reordered.extend_from_slice(&secret[64..]);

    let expected = derive_keys(&secret, &[], b"ParleyText");
    let swapped = derive_keys(&reordered, &[], b"ParleyText");
    assert_ne!(expected.0, swapped.0);

    let state = initialize_initiator_session(initiator(&k, false)).unwrap();
    assert_eq!(state.root_key(), &expected.0);
}

// ============================================================
// Initial State
// ============================================================

#[test]
fn test_initial_states_mirror_each_other() {
    let k = keys();

    let alice = initialize_initiator_session(initiator(&k, true)).unwrap();
    let bob = initialize_responder_session(responder(&k, true)).unwrap();

    assert_eq!(alice.root_key(), bob.root_key());
    assert_eq!(alice.base_key(), k.base.public_key());
    assert_eq!(bob.base_key(), k.base.public_key());

    assert_eq!(alice.ephemeral_public_key(), k.base.public_key());
    assert_eq!(alice.last_remote_ephemeral_key(), k.signed.public_key());
    assert_eq!(bob.ephemeral_public_key(), k.signed.public_key());
    assert_eq!(bob.last_remote_ephemeral_key(), k.base.public_key());

    assert_eq!(alice.remote_identity(), &k.bob.identity_key());
    assert_eq!(bob.remote_identity(), &k.alice.identity_key());

    for state in [&alice, &bob] {
        assert_eq!(state.chain_count(), 2);
        assert!(state.chain(k.base.public_key()).is_some());
        assert!(state
            .chain(k.signed.public_key())
            .is_some_and(|chain| chain.chain_key().is_placeholder()));
        assert_eq!(state.previous_counter(), 0);
        assert!(state.pending_pre_key().is_none());
    }
}

// ============================================================
// Prekey Consumption
// ============================================================

#[test]
fn test_one_time_pre_key_is_single_use() {
    let alice = register("alice");
    let bob = register("bob");
    let carol = register("carol");

    // both fetch the same bundle before Bob is back online
    let bundle = bob.bundle(Some(1));
    alice
        .protocol
        .process_pre_key_bundle(&bob.address, &bundle)
        .unwrap();
    carol
        .protocol
        .process_pre_key_bundle(&bob.address, &bundle)
        .unwrap();

    let from_alice = alice.send(&bob, b"first");
    let from_carol = carol.send(&bob, b"second");

    assert_eq!(bob.receive(&alice, &from_alice), b"first");
    let result = bob.protocol.decrypt(&carol.address, &from_carol);

    assert!(matches!(result, Err(ProtocolError::PreKeyNotFound(1))));
    assert!(!bob.protocol.has_session(&carol.address).unwrap());
}

#[test]
fn test_last_resort_pre_key_is_reusable() {
    let bob = register("bob");
    let last_resort = bob
        .protocol
        .store()
        .load_pre_key(LAST_RESORT_PRE_KEY_ID)
        .unwrap()
        .unwrap();
    let bundle = PreKeyBundle::new(
        bob.identity.identity_key(),
        &bob.signed_pre_key,
        Some(&last_resort),
    );

    for name in ["alice", "carol", "dave"] {
        let sender = register(name);
        sender
            .protocol
            .process_pre_key_bundle(&bob.address, &bundle)
            .unwrap();
        let message = sender.send(&bob, name.as_bytes());
        assert_eq!(bob.receive(&sender, &message), name.as_bytes());
    }

    assert!(bob
        .protocol
        .store()
        .load_pre_key(LAST_RESORT_PRE_KEY_ID)
        .unwrap()
        .is_some());
    assert_eq!(bob.protocol.store().pre_key_count(), 3);
}

#[test]
fn test_failed_decrypt_keeps_pre_key() {
    let alice = register("alice");
    let bob = register("bob");
    alice
        .protocol
        .process_pre_key_bundle(&bob.address, &bob.bundle(Some(2)))
        .unwrap();

    let message = alice.send(&bob, b"hello");
    let mut bytes = message.serialize().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;

    let result = bob.protocol.decrypt_pre_key_message(&alice.address, &bytes);
    assert!(matches!(result, Err(ProtocolError::MacVerification)));
    assert!(bob.protocol.store().load_pre_key(2).unwrap().is_some());
    assert!(!bob.protocol.has_session(&alice.address).unwrap());

    assert_eq!(bob.receive(&alice, &message), b"hello");
    assert!(bob.protocol.store().load_pre_key(2).unwrap().is_none());
}

#[test]
fn test_missing_signed_pre_key() {
    let alice = register("alice");
    let bob = register("bob");
    alice
        .protocol
        .process_pre_key_bundle(&bob.address, &bob.bundle(Some(1)))
        .unwrap();
    let message = alice.send(&bob, b"hello");

    bob.protocol.store().remove_signed_pre_key(1).unwrap();
    let result = bob.protocol.decrypt(&alice.address, &message);

    assert!(matches!(result, Err(ProtocolError::SignedPreKeyNotFound(1))));
    assert!(bob.protocol.store().load_pre_key(1).unwrap().is_some());
}

// ============================================================
// Bundle Validation and Trust
// ============================================================

#[test]
fn test_tampered_bundle_signature_rejected() {
    let alice = register("alice");
    let bob = register("bob");

    let mut bundle = bob.bundle(Some(1));
    bundle.signed_pre_key = *KeyPair::generate().public_key();

    let result = alice.protocol.process_pre_key_bundle(&bob.address, &bundle);
    assert!(matches!(result, Err(ProtocolError::InvalidSignature)));
    assert!(!alice.protocol.has_session(&bob.address).unwrap());
}

#[test]
fn test_bundle_signed_by_other_identity_rejected() {
    let alice = register("alice");
    let bob = register("bob");
    let mallory = register("mallory");

    let mut bundle = bob.bundle(Some(1));
    bundle.identity_key = mallory.identity.identity_key();

    let result = alice.protocol.process_pre_key_bundle(&bob.address, &bundle);
    assert!(matches!(result, Err(ProtocolError::InvalidSignature)));
}

#[test]
fn test_changed_bundle_identity_untrusted() {
    let alice = register("alice");
    let bob = register("bob");
    connect(&alice, &bob);

    // a different device now claims Bob's address
    let impostor = register("bob");
    let result = alice
        .protocol
        .process_pre_key_bundle(&bob.address, &impostor.bundle(Some(1)));

    assert!(matches!(result, Err(ProtocolError::UntrustedIdentity(_))));
    assert!(alice.protocol.has_session(&bob.address).unwrap());
}

#[test]
fn test_changed_sender_identity_untrusted() {
    let alice = register("alice");
    let bob = register("bob");
    handshake(&alice, &bob);

    let impostor = register("alice");
    impostor
        .protocol
        .process_pre_key_bundle(&bob.address, &bob.bundle(Some(2)))
        .unwrap();
    let message = impostor.send(&bob, b"it's me, alice");

    let result = bob.protocol.decrypt(&alice.address, &message);
    assert!(matches!(result, Err(ProtocolError::UntrustedIdentity(_))));
    assert!(bob.protocol.store().load_pre_key(2).unwrap().is_some());
}

#[test]
fn test_identity_saved_on_first_use() {
    let alice = register("alice");
    let bob = register("bob");
    handshake(&alice, &bob);

    let store = bob.protocol.store();
    assert!(store
        .is_trusted_identity(&alice.address, &alice.identity.identity_key())
        .unwrap());
    assert!(!store
        .is_trusted_identity(&alice.address, &generate_identity_key_pair().identity_key())
        .unwrap());
}
