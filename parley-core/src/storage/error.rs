//! Errors raised by key store backends.

use thiserror::Error;

/// Failure inside a [`KeyStore`](super::KeyStore) implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Prekey {0} was already consumed")]
    PreKeyConsumed(u32),

    #[error("Migration error: {0}")]
    Migration(String),
}
