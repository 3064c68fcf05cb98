// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory key store, for tests and embedders that persist elsewhere.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{KeyStore, StorageError};
use crate::keys::{IdentityKey, IdentityKeyPair, PreKeyRecord, SignedPreKeyRecord};
use crate::ratchet::SessionState;
use crate::session::SessionAddress;

/// Mutex-guarded maps. Nothing survives the process.
pub struct MemoryKeyStore {
    identity: IdentityKeyPair,
    sessions: Mutex<HashMap<SessionAddress, SessionState>>,
    pre_keys: Mutex<BTreeMap<u32, PreKeyRecord>>,
    signed_pre_keys: Mutex<BTreeMap<u32, SignedPreKeyRecord>>,
    identities: Mutex<HashMap<SessionAddress, IdentityKey>>,
}

impl MemoryKeyStore {
    pub fn new(identity: IdentityKeyPair) -> Self {
        MemoryKeyStore {
            identity,
            sessions: Mutex::new(HashMap::new()),
            pre_keys: Mutex::new(BTreeMap::new()),
            signed_pre_keys: Mutex::new(BTreeMap::new()),
            identities: Mutex::new(HashMap::new()),
        }
    }

    /// Number of one-time prekeys still available.
    pub fn pre_key_count(&self) -> usize {
        self.pre_keys.lock().expect("mutex poisoned").len()
    }
}

impl KeyStore for MemoryKeyStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError> {
        Ok(self.identity.clone())
    }

    fn load_session(&self, address: &SessionAddress) -> Result<Option<SessionState>, StorageError> {
        Ok(self
            .sessions
            .lock()
            .expect("mutex poisoned")
            .get(address)
            .cloned())
    }

    fn store_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
    ) -> Result<(), StorageError> {
        self.sessions
            .lock()
            .expect("mutex poisoned")
            .insert(address.clone(), state.clone());
        Ok(())
    }

    fn remove_session(&self, address: &SessionAddress) -> Result<(), StorageError> {
        self.sessions.lock().expect("mutex poisoned").remove(address);
        Ok(())
    }

    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        Ok(self.pre_keys.lock().expect("mutex poisoned").get(&id).cloned())
    }

    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError> {
        self.pre_keys
            .lock()
            .expect("mutex poisoned")
            .insert(record.id(), record.clone());
        Ok(())
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.pre_keys.lock().expect("mutex poisoned").remove(&id);
        Ok(())
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError> {
        Ok(self
            .signed_pre_keys
            .lock()
            .expect("mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        Ok(self
            .signed_pre_keys
            .lock()
            .expect("mutex poisoned")
            .get(&id)
            .cloned())
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError> {
        self.signed_pre_keys
            .lock()
            .expect("mutex poisoned")
            .insert(record.id(), record.clone());
        Ok(())
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.signed_pre_keys
            .lock()
            .expect("mutex poisoned")
            .remove(&id);
        Ok(())
    }

    fn is_trusted_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError> {
        Ok(self
            .identities
            .lock()
            .expect("mutex poisoned")
            .get(address)
            .map_or(true, |known| known == identity))
    }

    fn save_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<(), StorageError> {
        self.identities
            .lock()
            .expect("mutex poisoned")
            .insert(address.clone(), *identity);
        Ok(())
    }

    fn commit_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
        consumed_pre_key: Option<u32>,
        trusted_identity: Option<&IdentityKey>,
    ) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock().expect("mutex poisoned");
        let mut pre_keys = self.pre_keys.lock().expect("mutex poisoned");
        let mut identities = self.identities.lock().expect("mutex poisoned");

        if let Some(id) = consumed_pre_key {
            pre_keys.remove(&id).ok_or(StorageError::PreKeyConsumed(id))?;
        }
        sessions.insert(address.clone(), state.clone());
        if let Some(identity) = trusted_identity {
            identities.insert(address.clone(), *identity);
        }
        Ok(())
    }
}
