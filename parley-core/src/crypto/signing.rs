// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ed25519 Signing
//!
//! Identity keys sign signed prekeys so that a key server cannot substitute
//! its own prekey for a contact's.

use ring::signature::{self, Ed25519KeyPair, KeyPair as _, UnparsedPublicKey};
use zeroize::Zeroize;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of an Ed25519 public key.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifyingKey([u8; VERIFYING_KEY_LENGTH]);

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(&self.0[..8]))
    }
}

impl VerifyingKey {
    /// Creates a verifying key from raw bytes.
    pub fn from_bytes(bytes: [u8; VERIFYING_KEY_LENGTH]) -> Self {
        VerifyingKey(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_LENGTH] {
        &self.0
    }

    /// Verifies a signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        UnparsedPublicKey::new(&signature::ED25519, &self.0)
            .verify(message, &signature.0)
            .is_ok()
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

impl Signature {
    /// Creates a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Signature(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

/// Ed25519 signing key pair derived from a 32-byte seed.
pub struct SigningKeyPair {
    seed: [u8; 32],
    keypair: Ed25519KeyPair,
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Clone for SigningKeyPair {
    fn clone(&self) -> Self {
        SigningKeyPair::from_seed(&self.seed)
    }
}

impl Drop for SigningKeyPair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl SigningKeyPair {
    /// Deterministically derives a key pair from a seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let keypair = Ed25519KeyPair::from_seed_unchecked(seed)
            .expect("any 32-byte seed is a valid Ed25519 seed");
        SigningKeyPair {
            seed: *seed,
            keypair,
        }
    }

    /// Returns the public key.
    pub fn public_key(&self) -> VerifyingKey {
        let mut bytes = [0u8; VERIFYING_KEY_LENGTH];
        bytes.copy_from_slice(self.keypair.public_key().as_ref());
        VerifyingKey(bytes)
    }

    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes.copy_from_slice(self.keypair.sign(message).as_ref());
        Signature(bytes)
    }
}
