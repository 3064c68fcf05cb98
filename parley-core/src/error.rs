// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol error types.
//!
//! Every variant is terminal for the call that produced it. Nothing is
//! retried internally and no session state is persisted on failure.

use thiserror::Error;

use crate::crypto::curve::KeyError;
use crate::protocol::CodecError;
use crate::ratchet::ChainError;
use crate::storage::StorageError;

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Prekey {0} not found")]
    PreKeyNotFound(u32),

    #[error("Signed prekey {0} not found")]
    SignedPreKeyNotFound(u32),

    #[error("MAC verification failed")]
    MacVerification,

    #[error("Duplicate or out-of-window message (counter {0})")]
    DuplicateMessage(u32),

    #[error("Ratchet overflow: counter {requested} is more than {max} steps ahead")]
    RatchetOverflow { requested: u32, max: u32 },

    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] CodecError),

    #[error("No session for {0}")]
    NoSession(String),

    #[error("Invalid signed prekey signature")]
    InvalidSignature,

    #[error("Untrusted identity for {0}")]
    UntrustedIdentity(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ProtocolError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PreKeyConsumed(id) => ProtocolError::PreKeyNotFound(id),
            other => ProtocolError::Storage(other),
        }
    }
}

impl From<ChainError> for ProtocolError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Overflow { requested, max, .. } => {
                ProtocolError::RatchetOverflow { requested, max }
            }
            ChainError::Duplicate { counter } => ProtocolError::DuplicateMessage(counter),
            ChainError::Closed { requested, .. } => ProtocolError::DuplicateMessage(requested),
            ChainError::Exhausted => ProtocolError::DuplicateMessage(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_errors_map_to_protocol_errors() {
        let overflow = ProtocolError::from(ChainError::Overflow {
            current: 0,
            requested: 5000,
            max: 2000,
        });
        assert!(matches!(
            overflow,
            ProtocolError::RatchetOverflow {
                requested: 5000,
                max: 2000
            }
        ));

        let closed = ProtocolError::from(ChainError::Closed {
            current: 3,
            requested: 9,
        });
        assert!(matches!(closed, ProtocolError::DuplicateMessage(9)));
    }

    #[test]
    fn test_lost_pre_key_race_reports_missing_pre_key() {
        let err = ProtocolError::from(StorageError::PreKeyConsumed(7));
        assert!(matches!(err, ProtocolError::PreKeyNotFound(7)));

        let err = ProtocolError::from(StorageError::NotFound("x".into()));
        assert!(matches!(err, ProtocolError::Storage(StorageError::NotFound(_))));
    }
}
