// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Protocol
//!
//! Encrypts and decrypts messages for remote devices, creating sessions from
//! prekey bundles (outgoing) and prekey messages (incoming).
//!
//! Each call loads the session, advances a private copy and commits that
//! copy through [`KeyStore::commit_session`] only after everything
//! succeeded. Calls for the same address are serialized by a per-address
//! lock; different addresses run in parallel. A lock entry lives only while
//! some call for its address is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use zeroize::Zeroize;

use super::address::SessionAddress;
use super::handshake::{
    initialize_initiator_session, initialize_responder_session, InitiatorParameters,
    ResponderParameters,
};
use crate::config::ProtocolConfig;
use crate::crypto::cipher::MessageKeys;
use crate::crypto::curve::KeyPair;
use crate::error::ProtocolError;
use crate::keys::{generate_pre_keys, prune_signed_pre_keys, PreKeyBundle, PreKeyRecord};
use crate::protocol::{
    CiphertextMessage, CodecError, PreKeyWireMessage, WireMessage, CURRENT_VERSION,
};
use crate::ratchet::{maybe_step, step_sending, PendingPreKey, SessionState};
use crate::storage::{KeyStore, StorageError};

/// Session-level encryption on top of a [`KeyStore`].
pub struct SessionProtocol<S: KeyStore> {
    store: S,
    config: ProtocolConfig,
    locks: Mutex<HashMap<SessionAddress, Arc<Mutex<()>>>>,
}

impl<S: KeyStore> SessionProtocol<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, ProtocolConfig::default())
    }

    pub fn with_config(store: S, config: ProtocolConfig) -> Self {
        SessionProtocol {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Runs `f` holding the lock for `address`.
    fn with_session_lock<T>(
        &self,
        address: &SessionAddress,
        f: impl FnOnce() -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let lock = self
            .locks
            .lock()
            .expect("mutex poisoned")
            .entry(address.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().expect("mutex poisoned");
            f()
        };

        // Clones are only handed out under the map lock, so a count of two
        // (map + ours) means no other call is waiting on this address.
        let mut locks = self.locks.lock().expect("mutex poisoned");
        if Arc::strong_count(&lock) == 2 {
            locks.remove(address);
        }
        result
    }

    pub fn has_session(&self, address: &SessionAddress) -> Result<bool, ProtocolError> {
        Ok(self.store.load_session(address)?.is_some())
    }

    /// Generates and stores a batch of one-time prekeys starting at
    /// `start_id`. Returns the records so the caller can upload the public
    /// halves.
    pub fn replenish_pre_keys(&self, start_id: u32) -> Result<Vec<PreKeyRecord>, ProtocolError> {
        let records = generate_pre_keys(start_id, self.config.pre_key_batch_size);
        for record in &records {
            self.store.store_pre_key(record)?;
        }
        debug!(count = records.len(), start_id, "stored new one-time prekeys");
        Ok(records)
    }

    /// Removes signed prekeys whose grace period has run out.
    pub fn prune_signed_pre_keys(&self) -> Result<Vec<u32>, ProtocolError> {
        Ok(prune_signed_pre_keys(
            &self.store,
            crate::unix_now(),
            self.config.signed_pre_key_grace_period,
        )?)
    }

    /// Starts a session with `address` from a fetched prekey bundle.
    ///
    /// Until the remote side answers, every message we send carries the
    /// handshake fields so it can create its half of the session.
    pub fn process_pre_key_bundle(
        &self,
        address: &SessionAddress,
        bundle: &PreKeyBundle,
    ) -> Result<(), ProtocolError> {
        if !bundle.verify_signature() {
            warn!(%address, "prekey bundle signature invalid");
            return Err(ProtocolError::InvalidSignature);
        }
        if !self
            .store
            .is_trusted_identity(address, &bundle.identity_key)?
        {
            warn!(%address, "prekey bundle from untrusted identity");
            return Err(ProtocolError::UntrustedIdentity(address.to_string()));
        }

        self.with_session_lock(address, || {
            let our_identity = self.store.identity_key_pair()?;
            let base_key = KeyPair::generate();
            let base_public = *base_key.public_key();

            let mut state = initialize_initiator_session(InitiatorParameters {
                our_identity: &our_identity,
                our_base_key: base_key,
                their_identity: bundle.identity_key,
                their_signed_pre_key: bundle.signed_pre_key,
                their_one_time_pre_key: bundle.pre_key.map(|(_, key)| key),
            })?;
            state.set_pending_pre_key(PendingPreKey {
                pre_key_id: bundle.pre_key.map(|(id, _)| id),
                signed_pre_key_id: bundle.signed_pre_key_id,
                base_key: base_public,
            });

            self.store
                .commit_session(address, &state, None, Some(&bundle.identity_key))?;

            debug!(%address, "session created from prekey bundle");
            Ok(())
        })
    }

    /// Encrypts `plaintext` for `address`.
    pub fn encrypt(
        &self,
        address: &SessionAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, ProtocolError> {
        self.with_session_lock(address, || self.encrypt_locked(address, plaintext))
    }

    fn encrypt_locked(
        &self,
        address: &SessionAddress,
        plaintext: &[u8],
    ) -> Result<CiphertextMessage, ProtocolError> {
        let mut state = self
            .store
            .load_session(address)?
            .ok_or_else(|| ProtocolError::NoSession(address.to_string()))?;

        step_sending(&mut state)?;
        let (counter, mut seed) = state.next_sending_key()?;
        let keys = MessageKeys::derive(&seed, counter);
        seed.zeroize();

        let mut ciphertext = plaintext.to_vec();
        keys.apply_keystream(&mut ciphertext);

        let message = WireMessage::new(
            CURRENT_VERSION,
            *state.ephemeral_public_key(),
            counter,
            state.previous_counter(),
            ciphertext,
            &keys,
        );

        let outgoing = match state.pending_pre_key() {
            Some(pending) => {
                let our_identity = self.store.identity_key_pair()?.identity_key();
                CiphertextMessage::PreKey(PreKeyWireMessage::new(
                    CURRENT_VERSION,
                    pending.pre_key_id,
                    pending.signed_pre_key_id,
                    pending.base_key,
                    our_identity,
                    message,
                ))
            }
            None => CiphertextMessage::Whisper(message),
        };

        self.store.commit_session(address, &state, None, None)?;
        Ok(outgoing)
    }

    /// Decrypts either kind of message.
    pub fn decrypt(
        &self,
        address: &SessionAddress,
        message: &CiphertextMessage,
    ) -> Result<Vec<u8>, ProtocolError> {
        let version = match message {
            CiphertextMessage::Whisper(m) => m.version(),
            CiphertextMessage::PreKey(m) => m.version(),
        };
        if !self.config.version_policy.accepts(version) {
            return Err(CodecError::UnsupportedVersion(version).into());
        }

        match message {
            CiphertextMessage::Whisper(m) => self.decrypt_message(address, m),
            CiphertextMessage::PreKey(m) => self.decrypt_pre_key(address, m),
        }
    }

    /// Decodes and decrypts a serialized ratchet message.
    pub fn decrypt_whisper_message(
        &self,
        address: &SessionAddress,
        bytes: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let message = WireMessage::decode(bytes, &self.config.version_policy)?;
        self.decrypt_message(address, &message)
    }

    /// Decodes and decrypts a serialized prekey message, creating the
    /// session if needed.
    pub fn decrypt_pre_key_message(
        &self,
        address: &SessionAddress,
        bytes: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        let message = PreKeyWireMessage::decode(bytes, &self.config.version_policy)?;
        self.decrypt_pre_key(address, &message)
    }

    fn decrypt_message(
        &self,
        address: &SessionAddress,
        message: &WireMessage,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.with_session_lock(address, || {
            let mut state = self
                .store
                .load_session(address)?
                .ok_or_else(|| ProtocolError::NoSession(address.to_string()))?;

            let plaintext = self.decrypt_with_state(address, &mut state, message)?;
            state.clear_pending_pre_key();

            self.store.commit_session(address, &state, None, None)?;
            Ok(plaintext)
        })
    }

    fn decrypt_pre_key(
        &self,
        address: &SessionAddress,
        message: &PreKeyWireMessage,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.with_session_lock(address, || self.decrypt_pre_key_locked(address, message))
    }

    fn decrypt_pre_key_locked(
        &self,
        address: &SessionAddress,
        message: &PreKeyWireMessage,
    ) -> Result<Vec<u8>, ProtocolError> {
        let existing = self
            .store
            .load_session(address)?
            .filter(|state| state.base_key() == message.base_key());

        let (mut state, consumed, new_identity) = match existing {
            Some(state) => {
                debug!(%address, "prekey message for existing session");
                (state, None, false)
            }
            None => self.establish_responder(address, message)?,
        };

        let plaintext = self.decrypt_with_state(address, &mut state, message.message())?;
        state.clear_pending_pre_key();

        let trusted = new_identity.then(|| message.identity_key());
        self.store
            .commit_session(address, &state, consumed, trusted)
            .map_err(|e| {
                if let StorageError::PreKeyConsumed(id) = &e {
                    warn!(%address, pre_key_id = *id, "one-time prekey taken by another session");
                }
                ProtocolError::from(e)
            })?;
        if let Some(id) = consumed {
            debug!(%address, pre_key_id = id, "consumed one-time prekey");
        }
        Ok(plaintext)
    }

    /// Builds a responder session from a prekey message. Returns the state,
    /// the one-time prekey to erase on success and whether the remote
    /// identity still has to be saved.
    fn establish_responder(
        &self,
        address: &SessionAddress,
        message: &PreKeyWireMessage,
    ) -> Result<(SessionState, Option<u32>, bool), ProtocolError> {
        if !self
            .store
            .is_trusted_identity(address, message.identity_key())?
        {
            warn!(%address, "prekey message from untrusted identity");
            return Err(ProtocolError::UntrustedIdentity(address.to_string()));
        }

        let signed_id = message.signed_pre_key_id();
        let signed = self.store.load_signed_pre_key(signed_id)?.ok_or_else(|| {
            warn!(%address, signed_pre_key_id = signed_id, "signed prekey not found");
            ProtocolError::SignedPreKeyNotFound(signed_id)
        })?;

        let one_time = match message.pre_key_id() {
            Some(id) => Some(self.store.load_pre_key(id)?.ok_or_else(|| {
                warn!(%address, pre_key_id = id, "one-time prekey not found");
                ProtocolError::PreKeyNotFound(id)
            })?),
            None => None,
        };

        let our_identity = self.store.identity_key_pair()?;
        let state = initialize_responder_session(ResponderParameters {
            our_identity: &our_identity,
            our_signed_pre_key: signed.key_pair(),
            our_one_time_pre_key: one_time.as_ref().map(|record| record.key_pair()),
            their_identity: *message.identity_key(),
            their_base_key: *message.base_key(),
        })?;

        let consumed = one_time
            .filter(|record| !record.is_last_resort())
            .map(|record| record.id());

        debug!(%address, "session created from prekey message");
        Ok((state, consumed, true))
    }

    fn decrypt_with_state(
        &self,
        address: &SessionAddress,
        state: &mut SessionState,
        message: &WireMessage,
    ) -> Result<Vec<u8>, ProtocolError> {
        maybe_step(
            state,
            message.ephemeral_key(),
            message.previous_counter(),
            &self.config,
            crate::unix_now(),
        )?;

        let counter = message.counter();
        let mut seed = state
            .take_receiving_key(
                message.ephemeral_key(),
                counter,
                self.config.max_message_key_gap,
            )
            .map_err(|e| {
                warn!(%address, counter, error = %e, "no message key");
                ProtocolError::from(e)
            })?;
        let keys = MessageKeys::derive(&seed, counter);
        seed.zeroize();

        if !message.verify_mac(&keys) {
            warn!(%address, counter, "message MAC verification failed");
            return Err(ProtocolError::MacVerification);
        }

        let mut plaintext = message.ciphertext().to_vec();
        keys.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_identity_key_pair, generate_signed_pre_key};
    use crate::storage::MemoryKeyStore;

    fn lock_entries<S: KeyStore>(protocol: &SessionProtocol<S>) -> usize {
        protocol.locks.lock().unwrap().len()
    }

    #[test]
    fn test_lock_entries_are_released_after_each_call() {
        let bob_identity = generate_identity_key_pair();
        let bob_store = MemoryKeyStore::new(bob_identity.clone());
        let signed = generate_signed_pre_key(&bob_identity, 1).unwrap();
        bob_store.store_signed_pre_key(&signed).unwrap();
        let bob = SessionProtocol::new(bob_store);
        let alice = SessionProtocol::new(MemoryKeyStore::new(generate_identity_key_pair()));

        let bob_address = SessionAddress::new("bob", 1);
        let alice_address = SessionAddress::new("alice", 1);
        let bundle = PreKeyBundle::new(bob_identity.identity_key(), &signed, None);

        alice.process_pre_key_bundle(&bob_address, &bundle).unwrap();
        let message = alice.encrypt(&bob_address, b"hi").unwrap();
        bob.decrypt(&alice_address, &message).unwrap();

        assert_eq!(lock_entries(&alice), 0);
        assert_eq!(lock_entries(&bob), 0);
    }

    #[test]
    fn test_failed_calls_release_lock_entries() {
        let protocol = SessionProtocol::new(MemoryKeyStore::new(generate_identity_key_pair()));

        for device in 0..50 {
            let stranger = SessionAddress::new("stranger", device);
            assert!(protocol.encrypt(&stranger, b"x").is_err());
        }

        assert_eq!(lock_entries(&protocol), 0);
    }
}
