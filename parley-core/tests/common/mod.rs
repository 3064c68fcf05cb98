// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Registered parties backed by in-memory key stores, and helpers that walk
//! two of them through a handshake.

#![allow(dead_code)]

pub mod strategies;

use parley_core::*;

/// A registered device: identity, signed prekey 1, one-time prekeys 1 and 2
/// and the last-resort prekey, all stored in its own key store.
pub struct Party {
    pub address: SessionAddress,
    pub identity: IdentityKeyPair,
    pub signed_pre_key: SignedPreKeyRecord,
    pub protocol: SessionProtocol<MemoryKeyStore>,
}

impl Party {
    /// Bundle as a key server would hand it out.
    pub fn bundle(&self, pre_key_id: Option<u32>) -> PreKeyBundle {
        let pre_key = pre_key_id.map(|id| {
            self.protocol
                .store()
                .load_pre_key(id)
                .unwrap()
                .expect("prekey should be stored")
        });
        PreKeyBundle::new(
            self.identity.identity_key(),
            &self.signed_pre_key,
            pre_key.as_ref(),
        )
    }

    /// Our stored session with `other`.
    pub fn session_with(&self, other: &Party) -> SessionState {
        self.protocol
            .store()
            .load_session(&other.address)
            .unwrap()
            .expect("session should exist")
    }

    pub fn send(&self, to: &Party, plaintext: &[u8]) -> CiphertextMessage {
        self.protocol.encrypt(&to.address, plaintext).unwrap()
    }

    pub fn receive(&self, from: &Party, message: &CiphertextMessage) -> Vec<u8> {
        self.protocol.decrypt(&from.address, message).unwrap()
    }
}

pub fn register(name: &str) -> Party {
    register_with_config(name, ProtocolConfig::default())
}

pub fn register_with_config(name: &str, config: ProtocolConfig) -> Party {
    let identity = generate_identity_key_pair();
    let store = MemoryKeyStore::new(identity.clone());

    let signed_pre_key = generate_signed_pre_key(&identity, 1).unwrap();
    store.store_signed_pre_key(&signed_pre_key).unwrap();
    for record in generate_pre_keys(1, 2) {
        store.store_pre_key(&record).unwrap();
    }
    store
        .store_pre_key(&generate_last_resort_pre_key())
        .unwrap();

    Party {
        address: SessionAddress::new(name, 1),
        identity,
        signed_pre_key,
        protocol: SessionProtocol::with_config(store, config),
    }
}

/// `initiator` fetches `responder`'s bundle (one-time prekey 1) and sends a
/// first message, which `responder` decrypts.
pub fn handshake(initiator: &Party, responder: &Party) {
    initiator
        .protocol
        .process_pre_key_bundle(&responder.address, &responder.bundle(Some(1)))
        .unwrap();
    let first = initiator.send(responder, b"hello");
    assert_eq!(responder.receive(initiator, &first), b"hello");
}

/// Handshake plus one reply, so both sides send plain ratchet messages.
pub fn connected_pair() -> (Party, Party) {
    let alice = register("alice");
    let bob = register("bob");
    connect(&alice, &bob);
    (alice, bob)
}

pub fn connect(initiator: &Party, responder: &Party) {
    handshake(initiator, responder);
    let reply = responder.send(initiator, b"hi");
    assert_eq!(initiator.receive(responder, &reply), b"hi");
}

/// The ratchet message inside either kind of ciphertext.
pub fn wire(message: &CiphertextMessage) -> &WireMessage {
    match message {
        CiphertextMessage::Whisper(m) => m,
        CiphertextMessage::PreKey(m) => m.message(),
    }
}
