// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identity Keys
//!
//! A device identity is a 32-byte seed. The X25519 agreement key used in the
//! handshake and the Ed25519 key that signs prekeys are both derived from it
//! with domain separation, so persisting the seed is enough to restore both.

use ring::digest;
use ring::rand::SystemRandom;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::curve::{KeyError, KeyPair, PrivateKey, PublicKey, PUBLIC_KEY_LENGTH};
use crate::crypto::kdf::derive_keys;
use crate::crypto::signing::{Signature, SigningKeyPair, VerifyingKey, VERIFYING_KEY_LENGTH};

/// KDF info for splitting the identity seed.
const IDENTITY_KEYS_INFO: &[u8] = b"ParleyIdentityKeys";

/// Serialized length of an [`IdentityKey`].
pub const IDENTITY_KEY_LENGTH: usize = PUBLIC_KEY_LENGTH + VERIFYING_KEY_LENGTH;

/// Public half of an identity: agreement key plus signing key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct IdentityKey {
    agreement: PublicKey,
    signing: VerifyingKey,
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityKey({})", &self.fingerprint()[..16])
    }
}

impl IdentityKey {
    /// Creates an identity key from its parts.
    pub fn new(agreement: PublicKey, signing: VerifyingKey) -> Self {
        IdentityKey { agreement, signing }
    }

    /// The X25519 key used in the handshake.
    pub fn agreement_key(&self) -> &PublicKey {
        &self.agreement
    }

    /// The Ed25519 key that signs prekeys.
    pub fn signing_key(&self) -> &VerifyingKey {
        &self.signing
    }

    /// Serializes as `agreement (33 bytes) || signing (32 bytes)`.
    pub fn serialize(&self) -> [u8; IDENTITY_KEY_LENGTH] {
        let mut out = [0u8; IDENTITY_KEY_LENGTH];
        out[..PUBLIC_KEY_LENGTH].copy_from_slice(&self.agreement.serialize());
        out[PUBLIC_KEY_LENGTH..].copy_from_slice(self.signing.as_bytes());
        out
    }

    /// Parses the 65-byte serialization.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != IDENTITY_KEY_LENGTH {
            return Err(KeyError::Invalid(format!(
                "identity key must be {} bytes, got {}",
                IDENTITY_KEY_LENGTH,
                bytes.len()
            )));
        }
        let agreement = PublicKey::from_bytes(&bytes[..PUBLIC_KEY_LENGTH])?;
        let mut signing = [0u8; VERIFYING_KEY_LENGTH];
        signing.copy_from_slice(&bytes[PUBLIC_KEY_LENGTH..]);
        Ok(IdentityKey {
            agreement,
            signing: VerifyingKey::from_bytes(signing),
        })
    }

    /// Returns the hex SHA-256 fingerprint, for safety-number style comparison.
    pub fn fingerprint(&self) -> String {
        hex::encode(digest::digest(&digest::SHA256, &self.serialize()))
    }

    /// Verifies a signature made by the matching identity.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.signing.verify(message, signature)
    }
}

impl TryFrom<Vec<u8>> for IdentityKey {
    type Error = KeyError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        IdentityKey::from_bytes(&bytes)
    }
}

impl From<IdentityKey> for Vec<u8> {
    fn from(key: IdentityKey) -> Self {
        key.serialize().to_vec()
    }
}

/// Long-lived device identity. Created once at registration, never rotated.
#[derive(Clone)]
pub struct IdentityKeyPair {
    seed: [u8; 32],
    agreement: KeyPair,
    signing: SigningKeyPair,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("identity_key", &self.identity_key())
            .finish()
    }
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl IdentityKeyPair {
    /// Generates a new identity from the system random source.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let mut seed = ring::rand::generate::<[u8; 32]>(&rng)
            .expect("System RNG should not fail")
            .expose();
        let identity = Self::from_seed(&seed);
        seed.zeroize();
        identity
    }

    /// Restores an identity from its seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let (mut agreement_seed, mut signing_seed) = derive_keys(seed, &[], IDENTITY_KEYS_INFO);

        let agreement = KeyPair::from_private(
            PrivateKey::from_bytes(&agreement_seed).expect("derived key is 32 bytes"),
        );
        let signing = SigningKeyPair::from_seed(&signing_seed);

        agreement_seed.zeroize();
        signing_seed.zeroize();

        IdentityKeyPair {
            seed: *seed,
            agreement,
            signing,
        }
    }

    /// Returns the seed, for persistence by a key store.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Returns the public identity key.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            agreement: *self.agreement.public_key(),
            signing: self.signing.public_key(),
        }
    }

    /// Returns the agreement key pair used in the handshake.
    pub fn agreement_key_pair(&self) -> &KeyPair {
        &self.agreement
    }

    /// Signs a message with the identity signing key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}
