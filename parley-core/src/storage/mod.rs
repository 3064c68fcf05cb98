// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Storage Module
//!
//! The [`KeyStore`] trait is the only way the protocol reaches persistent
//! state: the local identity, prekeys, per-device sessions and the remote
//! identities seen so far. Two implementations ship with the crate, an
//! in-memory store and an encrypted SQLite store.

mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;

pub use error::StorageError;
pub use memory::MemoryKeyStore;
pub use sqlite::SqliteKeyStore;

use crate::keys::{IdentityKey, IdentityKeyPair, PreKeyRecord, SignedPreKeyRecord};
use crate::ratchet::SessionState;
use crate::session::SessionAddress;

/// Persistent key and session storage.
///
/// Calls are synchronous. Implementations must be safe to share between
/// threads; the protocol serializes access per session itself.
pub trait KeyStore: Send + Sync {
    /// Our own long-term identity.
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError>;

    fn load_session(&self, address: &SessionAddress) -> Result<Option<SessionState>, StorageError>;

    fn store_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
    ) -> Result<(), StorageError>;

    fn remove_session(&self, address: &SessionAddress) -> Result<(), StorageError>;

    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError>;

    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError>;

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError>;

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError>;

    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        Ok(self
            .load_signed_pre_keys()?
            .into_iter()
            .find(|record| record.id() == id))
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError>;

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError>;

    /// Whether `identity` may be used for `address`. Unknown addresses are
    /// trusted on first use.
    fn is_trusted_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError>;

    fn save_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<(), StorageError>;

    /// Persists a session together with the side effects of creating it.
    ///
    /// `consumed_pre_key` is erased and `trusted_identity` is recorded for
    /// `address`. Either every change becomes visible or none does. If the
    /// consumed prekey is already gone (another session took it first) the
    /// commit fails with [`StorageError::PreKeyConsumed`] and nothing is
    /// written.
    fn commit_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
        consumed_pre_key: Option<u32>,
        trusted_identity: Option<&IdentityKey>,
    ) -> Result<(), StorageError>;
}
