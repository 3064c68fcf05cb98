// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Prekeys
//!
//! One-time prekeys, the last-resort prekey, signed prekeys and the bundle a
//! contact fetches to start a session while we are offline. Generation has no
//! side effects beyond drawing randomness; callers upload the public parts and
//! persist the records through their key store.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;
use tracing::debug;

use super::identity::{IdentityKey, IdentityKeyPair};
use crate::crypto::curve::{KeyError, KeyPair, PublicKey};
use crate::crypto::signing::{Signature, SIGNATURE_LENGTH};
use crate::storage::{KeyStore, StorageError};

/// Largest prekey id (ids are 24-bit).
pub const MAX_PRE_KEY_ID: u32 = 0xFF_FFFF;

/// Id reserved for the last-resort prekey.
pub const LAST_RESORT_PRE_KEY_ID: u32 = MAX_PRE_KEY_ID;

/// Number of ids available to ordinary one-time prekeys (`1..=0xFFFFFE`).
const ORDINARY_PRE_KEY_IDS: u32 = MAX_PRE_KEY_ID - 1;

fn check_id(id: u32) -> Result<(), KeyError> {
    if id > MAX_PRE_KEY_ID {
        return Err(KeyError::Invalid(format!(
            "prekey id {id:#x} exceeds 24 bits"
        )));
    }
    Ok(())
}

/// A one-time (or last-resort) prekey.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    /// Creates a record, validating the 24-bit id.
    pub fn new(id: u32, key_pair: KeyPair) -> Result<Self, KeyError> {
        check_id(id)?;
        Ok(PreKeyRecord { id, key_pair })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn public_key(&self) -> &PublicKey {
        self.key_pair.public_key()
    }

    /// The last-resort key is never erased after use.
    pub fn is_last_resort(&self) -> bool {
        self.id == LAST_RESORT_PRE_KEY_ID
    }
}

/// A medium-lived prekey signed by the identity key.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: u32,
    key_pair: KeyPair,
    #[serde_as(as = "[_; 64]")]
    signature: [u8; SIGNATURE_LENGTH],
    created_at: u64,
    confirmed: bool,
}

impl SignedPreKeyRecord {
    /// Creates a record from its parts.
    pub fn new(
        id: u32,
        key_pair: KeyPair,
        signature: Signature,
        created_at: u64,
        confirmed: bool,
    ) -> Result<Self, KeyError> {
        check_id(id)?;
        Ok(SignedPreKeyRecord {
            id,
            key_pair,
            signature: *signature.as_bytes(),
            created_at,
            confirmed,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn public_key(&self) -> &PublicKey {
        self.key_pair.public_key()
    }

    pub fn signature(&self) -> Signature {
        Signature::from_bytes(self.signature)
    }

    /// Unix timestamp (seconds) of generation.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Whether the key server acknowledged the upload.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Marks the record as uploaded.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Checks the signature against the signer's identity.
    pub fn verify(&self, identity: &IdentityKey) -> bool {
        identity.verify(&self.public_key().serialize(), &self.signature())
    }
}

/// Everything an initiator needs to start a session with us.
#[derive(Clone, Debug)]
pub struct PreKeyBundle {
    pub identity_key: IdentityKey,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: PublicKey,
    pub signed_pre_key_signature: Signature,
    /// One-time prekey, absent when the server ran out.
    pub pre_key: Option<(u32, PublicKey)>,
}

impl PreKeyBundle {
    /// Assembles a bundle from local records.
    pub fn new(
        identity_key: IdentityKey,
        signed_pre_key: &SignedPreKeyRecord,
        pre_key: Option<&PreKeyRecord>,
    ) -> Self {
        PreKeyBundle {
            identity_key,
            signed_pre_key_id: signed_pre_key.id(),
            signed_pre_key: *signed_pre_key.public_key(),
            signed_pre_key_signature: signed_pre_key.signature(),
            pre_key: pre_key.map(|r| (r.id(), *r.public_key())),
        }
    }

    /// Checks the signed prekey signature against the bundle identity.
    pub fn verify_signature(&self) -> bool {
        self.identity_key.verify(
            &self.signed_pre_key.serialize(),
            &self.signed_pre_key_signature,
        )
    }
}

/// Generates a new device identity.
pub fn generate_identity_key_pair() -> IdentityKeyPair {
    IdentityKeyPair::generate()
}

/// Generates `count` one-time prekeys with consecutive ids from `start_id`.
///
/// Ids wrap within `1..=0xFFFFFE`, so the last-resort id is never produced.
pub fn generate_pre_keys(start_id: u32, count: u32) -> Vec<PreKeyRecord> {
    let start = start_id.clamp(1, ORDINARY_PRE_KEY_IDS) - 1;
    (0..count)
        .map(|i| PreKeyRecord {
            id: (start + i % ORDINARY_PRE_KEY_IDS) % ORDINARY_PRE_KEY_IDS + 1,
            key_pair: KeyPair::generate(),
        })
        .collect()
}

/// Generates the last-resort prekey.
pub fn generate_last_resort_pre_key() -> PreKeyRecord {
    PreKeyRecord {
        id: LAST_RESORT_PRE_KEY_ID,
        key_pair: KeyPair::generate(),
    }
}

/// Generates a signed prekey for `identity`.
pub fn generate_signed_pre_key(
    identity: &IdentityKeyPair,
    key_id: u32,
) -> Result<SignedPreKeyRecord, KeyError> {
    let key_pair = KeyPair::generate();
    let signature = identity.sign(&key_pair.public_key().serialize());
    SignedPreKeyRecord::new(key_id, key_pair, signature, crate::unix_now(), false)
}

/// Selects signed prekeys that have outlived the grace window.
///
/// The newest key is the active one and always kept. The newest of the older
/// keys is kept too, so handshakes started just before a rotation still
/// find their key. Any other key older than `grace` is returned for deletion.
pub fn signed_pre_keys_to_prune(
    records: &[SignedPreKeyRecord],
    now: u64,
    grace: Duration,
) -> Vec<u32> {
    let mut by_age: Vec<&SignedPreKeyRecord> = records.iter().collect();
    by_age.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    by_age
        .into_iter()
        .skip(2)
        .filter(|r| now.saturating_sub(r.created_at) > grace.as_secs())
        .map(|r| r.id)
        .collect()
}

/// Applies [`signed_pre_keys_to_prune`] to a store, returning the removed ids.
pub fn prune_signed_pre_keys<S: KeyStore + ?Sized>(
    store: &S,
    now: u64,
    grace: Duration,
) -> Result<Vec<u32>, StorageError> {
    let records = store.load_signed_pre_keys()?;
    let expired = signed_pre_keys_to_prune(&records, now, grace);
    for id in &expired {
        store.remove_signed_pre_key(*id)?;
        debug!(signed_pre_key_id = id, "pruned expired signed prekey");
    }
    Ok(expired)
}
