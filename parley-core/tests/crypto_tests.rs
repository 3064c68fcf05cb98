// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for crypto::curve, crypto::cipher and crypto::encryption (sealing)

use parley_core::crypto::*;
use proptest::prelude::*;

// ============================================================
// Key Agreement
// ============================================================

#[test]
fn test_agreement_is_symmetric() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();

    let ab = alice.private_key().agree(bob.public_key()).unwrap();
    let ba = bob.private_key().agree(alice.public_key()).unwrap();

    assert_eq!(ab, ba);
}

#[test]
fn test_calculate_agreement_strips_type_prefix() {
    let ours = KeyPair::generate();
    let theirs = KeyPair::generate();
    let private = ours.private_key().to_bytes();

    let prefixed = calculate_agreement(&private, &theirs.public_key().serialize()).unwrap();
    let raw = calculate_agreement(&private, theirs.public_key().point()).unwrap();

    assert_eq!(prefixed, raw);
}

#[test]
fn test_calculate_agreement_rejects_bad_lengths() {
    let ours = KeyPair::generate();
    let theirs = KeyPair::generate().public_key().serialize();

    assert_eq!(
        calculate_agreement(&ours.private_key().to_bytes()[..31], &theirs),
        Err(KeyError::BadPrivateKeyLength(31))
    );
    assert_eq!(
        calculate_agreement(&ours.private_key().to_bytes(), &theirs[..20]),
        Err(KeyError::BadPublicKeyLength(20))
    );
}

#[test]
fn test_calculate_agreement_rejects_unknown_key_type() {
    let ours = KeyPair::generate();
    let mut theirs = KeyPair::generate().public_key().serialize();
    theirs[0] = 0x06;

    assert_eq!(
        calculate_agreement(&ours.private_key().to_bytes(), &theirs),
        Err(KeyError::BadKeyType(0x06))
    );
}

#[test]
fn test_public_key_serialization() {
    let pair = KeyPair::generate();
    let bytes = pair.public_key().serialize();

    assert_eq!(bytes.len(), PUBLIC_KEY_LENGTH);
    assert_eq!(bytes[0], 0x05);
    assert_eq!(&PublicKey::from_bytes(&bytes).unwrap(), pair.public_key());
}

// ============================================================
// Message Keys
// ============================================================

#[test]
fn test_message_keys_are_deterministic() {
    let seed = [3u8; KEY_LENGTH];
    let a = MessageKeys::derive(&seed, 5);
    let b = MessageKeys::derive(&seed, 5);

    let mut data_a = b"same input".to_vec();
    let mut data_b = data_a.clone();
    a.apply_keystream(&mut data_a);
    b.apply_keystream(&mut data_b);

    assert_eq!(data_a, data_b);
    assert_eq!(a.mac(b"header"), b.mac(b"header"));
}

#[test]
fn test_counter_changes_keystream() {
    let seed = [3u8; KEY_LENGTH];
    let mut first = vec![0u8; 32];
    let mut second = vec![0u8; 32];

    MessageKeys::derive(&seed, 0).apply_keystream(&mut first);
    MessageKeys::derive(&seed, 1).apply_keystream(&mut second);

    assert_ne!(first, second);
}

#[test]
fn test_truncated_mac_verification() {
    let keys = MessageKeys::derive(&[9u8; KEY_LENGTH], 0);
    let mac = keys.mac(b"payload");

    assert_eq!(mac.len(), MAC_LENGTH);
    assert!(keys.verify_mac(b"payload", &mac));
    assert!(!keys.verify_mac(b"payloaD", &mac));
    assert!(!keys.verify_mac(b"payload", &mac[..7]));

    let other = MessageKeys::derive(&[8u8; KEY_LENGTH], 0);
    assert!(!other.verify_mac(b"payload", &mac));
}

proptest! {
    #[test]
    fn prop_keystream_is_involution(seed in any::<[u8; 32]>(), counter in any::<u32>(), data in prop::collection::vec(any::<u8>(), 0..256)) {
        let keys = MessageKeys::derive(&seed, counter);
        let mut buffer = data.clone();
        keys.apply_keystream(&mut buffer);
        keys.apply_keystream(&mut buffer);
        prop_assert_eq!(buffer, data);
    }
}

// ============================================================
// Key Store Sealing
// ============================================================

#[test]
fn test_sealed_blob_round_trip() {
    let key = SymmetricKey::generate();
    let sealed = seal(&key, b"session/alice.1", b"session state").unwrap();

    assert_ne!(&sealed[..], b"session state");
    assert_eq!(
        open(&key, b"session/alice.1", &sealed).unwrap(),
        b"session state"
    );
}

#[test]
fn test_sealed_blob_rejects_wrong_key() {
    let sealed = seal(&SymmetricKey::generate(), b"identity", b"secret").unwrap();
    assert!(matches!(
        open(&SymmetricKey::generate(), b"identity", &sealed),
        Err(SealError::Open)
    ));
}

#[test]
fn test_sealed_blob_is_bound_to_its_row() {
    let key = SymmetricKey::generate();
    let sealed = seal(&key, b"session/alice.1", b"state").unwrap();

    assert!(open(&key, b"session/alice.2", &sealed).is_err());
    assert!(open(&key, b"pre_key/1", &sealed).is_err());
}

#[test]
fn test_sealed_blob_rejects_tampering() {
    let key = SymmetricKey::generate();
    let mut sealed = seal(&key, b"pre_key/7", b"secret").unwrap();
    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;

    assert!(open(&key, b"pre_key/7", &sealed).is_err());
}

#[test]
fn test_sealing_is_randomized() {
    let key = SymmetricKey::generate();
    let a = seal(&key, b"identity", b"same").unwrap();
    let b = seal(&key, b"identity", b"same").unwrap();

    assert_eq!(a.len(), MIN_SEALED_LENGTH + 4);
    assert_ne!(a, b);
}
