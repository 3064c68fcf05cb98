// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! SQLite key store.
//!
//! Secret material (identity seed, prekey records, session states) is
//! serialized with serde_json and sealed under the storage key before it
//! reaches the database. Each blob is sealed against its row key, see
//! [`seal`]. Remote identity keys are public and stored in the clear.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use zeroize::Zeroize;

use super::migration::{migrate, schema_version, SCHEMA};
use super::{KeyStore, StorageError};
use crate::crypto::encryption::{open, seal, SymmetricKey};
use crate::keys::{IdentityKey, IdentityKeyPair, PreKeyRecord, SignedPreKeyRecord};
use crate::ratchet::SessionState;
use crate::session::SessionAddress;

const IDENTITY_CONTEXT: &[u8] = b"identity";

fn session_context(address: &SessionAddress) -> Vec<u8> {
    format!("session/{address}").into_bytes()
}

fn pre_key_context(id: u32) -> Vec<u8> {
    format!("pre_key/{id}").into_bytes()
}

fn signed_pre_key_context(id: u32) -> Vec<u8> {
    format!("signed_pre_key/{id}").into_bytes()
}

/// SQLite-backed [`KeyStore`].
pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
    encryption_key: SymmetricKey,
}

impl SqliteKeyStore {
    /// Opens or creates a key store database at the given path.
    pub fn open<P: AsRef<Path>>(
        path: P,
        encryption_key: SymmetricKey,
    ) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(path)?, encryption_key)
    }

    /// Creates an in-memory key store (for testing).
    pub fn in_memory(encryption_key: SymmetricKey) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, encryption_key)
    }

    fn with_connection(
        mut conn: Connection,
        encryption_key: SymmetricKey,
    ) -> Result<Self, StorageError> {
        migrate(&mut conn, SCHEMA)?;
        Ok(SqliteKeyStore {
            conn: Mutex::new(conn),
            encryption_key,
        })
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        schema_version(&self.conn.lock().expect("mutex poisoned"))
    }

    /// Saves the local identity. Replaces any existing one.
    pub fn store_identity_key_pair(&self, identity: &IdentityKeyPair) -> Result<(), StorageError> {
        let sealed = seal(&self.encryption_key, IDENTITY_CONTEXT, identity.seed())
            .map_err(|e| StorageError::Encryption(e.to_string()))?;

        self.conn.lock().expect("mutex poisoned").execute(
            "INSERT OR REPLACE INTO local_identity (id, seed_encrypted, created_at)
             VALUES (0, ?1, ?2)",
            params![sealed, crate::unix_now() as i64],
        )?;
        Ok(())
    }

    fn seal_record<T: Serialize>(
        &self,
        context: &[u8],
        value: &T,
    ) -> Result<Vec<u8>, StorageError> {
        let mut json =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let sealed = seal(&self.encryption_key, context, &json)
            .map_err(|e| StorageError::Encryption(e.to_string()));
        json.zeroize();
        sealed
    }

    fn open_record<T: DeserializeOwned>(
        &self,
        context: &[u8],
        sealed: &[u8],
    ) -> Result<T, StorageError> {
        let mut json = open(&self.encryption_key, context, sealed)
            .map_err(|e| StorageError::Encryption(e.to_string()))?;
        let value =
            serde_json::from_slice(&json).map_err(|e| StorageError::Serialization(e.to_string()));
        json.zeroize();
        value
    }

    fn load_blob(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .conn
            .lock()
            .expect("mutex poisoned")
            .query_row(sql, params, |row| row.get::<_, Vec<u8>>(0))
            .optional()?)
    }
}

impl KeyStore for SqliteKeyStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StorageError> {
        let sealed = self
            .load_blob("SELECT seed_encrypted FROM local_identity WHERE id = 0", [])?
            .ok_or_else(|| StorageError::NotFound("local identity".to_string()))?;

        let mut seed = open(&self.encryption_key, IDENTITY_CONTEXT, &sealed)
            .map_err(|e| StorageError::Encryption(e.to_string()))?;
        let bytes: Result<[u8; 32], StorageError> = seed
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Serialization("identity seed must be 32 bytes".into()));
        seed.zeroize();

        let mut bytes = bytes?;
        let identity = IdentityKeyPair::from_seed(&bytes);
        bytes.zeroize();
        Ok(identity)
    }

    fn load_session(&self, address: &SessionAddress) -> Result<Option<SessionState>, StorageError> {
        self.load_blob(
            "SELECT state_encrypted FROM sessions WHERE name = ?1 AND device_id = ?2",
            params![address.name(), address.device_id()],
        )?
        .map(|sealed| self.open_record(&session_context(address), &sealed))
        .transpose()
    }

    fn store_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
    ) -> Result<(), StorageError> {
        self.commit_session(address, state, None, None)
    }

    fn remove_session(&self, address: &SessionAddress) -> Result<(), StorageError> {
        self.conn.lock().expect("mutex poisoned").execute(
            "DELETE FROM sessions WHERE name = ?1 AND device_id = ?2",
            params![address.name(), address.device_id()],
        )?;
        Ok(())
    }

    fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, StorageError> {
        self.load_blob(
            "SELECT record_encrypted FROM pre_keys WHERE id = ?1",
            params![id],
        )?
        .map(|sealed| self.open_record(&pre_key_context(id), &sealed))
        .transpose()
    }

    fn store_pre_key(&self, record: &PreKeyRecord) -> Result<(), StorageError> {
        let sealed = self.seal_record(&pre_key_context(record.id()), record)?;
        self.conn.lock().expect("mutex poisoned").execute(
            "INSERT OR REPLACE INTO pre_keys (id, record_encrypted) VALUES (?1, ?2)",
            params![record.id(), sealed],
        )?;
        Ok(())
    }

    fn remove_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.conn
            .lock()
            .expect("mutex poisoned")
            .execute("DELETE FROM pre_keys WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn load_signed_pre_keys(&self) -> Result<Vec<SignedPreKeyRecord>, StorageError> {
        let rows: Vec<(u32, Vec<u8>)> = {
            let conn = self.conn.lock().expect("mutex poisoned");
            let mut stmt =
                conn.prepare("SELECT id, record_encrypted FROM signed_pre_keys ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let rows = rows.collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.iter()
            .map(|(id, sealed)| self.open_record(&signed_pre_key_context(*id), sealed))
            .collect()
    }

    fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, StorageError> {
        self.load_blob(
            "SELECT record_encrypted FROM signed_pre_keys WHERE id = ?1",
            params![id],
        )?
        .map(|sealed| self.open_record(&signed_pre_key_context(id), &sealed))
        .transpose()
    }

    fn store_signed_pre_key(&self, record: &SignedPreKeyRecord) -> Result<(), StorageError> {
        let sealed = self.seal_record(&signed_pre_key_context(record.id()), record)?;
        self.conn.lock().expect("mutex poisoned").execute(
            "INSERT OR REPLACE INTO signed_pre_keys (id, record_encrypted, created_at)
             VALUES (?1, ?2, ?3)",
            params![record.id(), sealed, record.created_at() as i64],
        )?;
        Ok(())
    }

    fn remove_signed_pre_key(&self, id: u32) -> Result<(), StorageError> {
        self.conn
            .lock()
            .expect("mutex poisoned")
            .execute("DELETE FROM signed_pre_keys WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn is_trusted_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<bool, StorageError> {
        let known = self.load_blob(
            "SELECT identity_key FROM remote_identities WHERE name = ?1 AND device_id = ?2",
            params![address.name(), address.device_id()],
        )?;
        Ok(known.map_or(true, |bytes| bytes == identity.serialize()))
    }

    fn save_identity(
        &self,
        address: &SessionAddress,
        identity: &IdentityKey,
    ) -> Result<(), StorageError> {
        upsert_identity(&self.conn.lock().expect("mutex poisoned"), address, identity)
    }

    fn commit_session(
        &self,
        address: &SessionAddress,
        state: &SessionState,
        consumed_pre_key: Option<u32>,
        trusted_identity: Option<&IdentityKey>,
    ) -> Result<(), StorageError> {
        let sealed = self.seal_record(&session_context(address), state)?;

        let mut conn = self.conn.lock().expect("mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sessions (name, device_id, state_encrypted, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                address.name(),
                address.device_id(),
                sealed,
                crate::unix_now() as i64
            ],
        )?;
        if let Some(id) = consumed_pre_key {
            if tx.execute("DELETE FROM pre_keys WHERE id = ?1", params![id])? != 1 {
                return Err(StorageError::PreKeyConsumed(id));
            }
        }
        if let Some(identity) = trusted_identity {
            upsert_identity(&tx, address, identity)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn upsert_identity(
    conn: &Connection,
    address: &SessionAddress,
    identity: &IdentityKey,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO remote_identities (name, device_id, identity_key, first_seen)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (name, device_id) DO UPDATE SET identity_key = excluded.identity_key",
        params![
            address.name(),
            address.device_id(),
            identity.serialize().to_vec(),
            crate::unix_now() as i64
        ],
    )?;
    Ok(())
}
