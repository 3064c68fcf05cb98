// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Store Sealing
//!
//! Key-store blobs are sealed with XChaCha20-Poly1305 before they are
//! written. Every blob is bound to the row it lives in: the caller passes a
//! context string (for example `session/alice.2`) that is authenticated as
//! associated data, so a blob copied into another row no longer opens.
//!
//! Layout: `format (1) || nonce (24) || ciphertext || tag (16)`

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum SealError {
    #[error("Failed to seal blob")]
    Seal,
    #[error("Blob does not open under this key and context")]
    Open,
    #[error("Sealed blob truncated ({0} bytes)")]
    Truncated(usize),
    #[error("Unknown sealed blob format {0:#04x}")]
    UnknownFormat(u8),
}

const SEALED_FORMAT: u8 = 0x01;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Shortest possible sealed blob (empty plaintext).
pub const MIN_SEALED_LENGTH: usize = 1 + NONCE_LEN + TAG_LEN;

/// 256-bit key that seals everything the key store persists.
#[derive(Clone)]
pub struct SymmetricKey([u8; 32]);

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        SystemRandom::new()
            .fill(&mut bytes)
            .expect("System RNG should not fail");
        SymmetricKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SymmetricKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn aead(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }
}

/// Seals `plaintext` under `key`, binding it to `context`.
pub fn seal(key: &SymmetricKey, context: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| SealError::Seal)?;

    let body = key
        .aead()
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: context,
            },
        )
        .map_err(|_| SealError::Seal)?;

    let mut sealed = Vec::with_capacity(1 + NONCE_LEN + body.len());
    sealed.push(SEALED_FORMAT);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&body);
    Ok(sealed)
}

/// Opens a blob produced by [`seal`] with the same key and context.
pub fn open(key: &SymmetricKey, context: &[u8], sealed: &[u8]) -> Result<Vec<u8>, SealError> {
    if sealed.len() < MIN_SEALED_LENGTH {
        return Err(SealError::Truncated(sealed.len()));
    }
    if sealed[0] != SEALED_FORMAT {
        return Err(SealError::UnknownFormat(sealed[0]));
    }

    let (nonce, body) = sealed[1..].split_at(NONCE_LEN);
    key.aead()
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: body,
                aad: context,
            },
        )
        .map_err(|_| SealError::Open)
}
