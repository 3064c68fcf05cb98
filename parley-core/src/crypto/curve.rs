// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Curve25519 Key Agreement
//!
//! X25519 key pairs in the versioned serialization used on the wire:
//! public keys are `0x05 || point (32 bytes)`, private keys are raw
//! 32-byte scalars.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Type byte prefixed to serialized public keys.
pub const DJB_KEY_TYPE: u8 = 0x05;

/// Length of a serialized (versioned) public key.
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// Length of a raw private key.
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Key handling errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid public key length: {0} bytes")]
    BadPublicKeyLength(usize),

    #[error("Invalid public key type byte: {0:#04x}")]
    BadKeyType(u8),

    #[error("Invalid private key length: {0} bytes")]
    BadPrivateKeyLength(usize),

    #[error("Key agreement produced a non-contributory result")]
    NonContributory,

    #[error("Invalid key material: {0}")]
    Invalid(String),
}

/// A Curve25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct PublicKey {
    point: [u8; 32],
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.point[..8]))
    }
}

impl PublicKey {
    /// Parses a public key from 32 raw bytes or 33 versioned bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let point: [u8; 32] = match bytes.len() {
            32 => bytes.try_into().map_err(|_| KeyError::BadPublicKeyLength(32))?,
            PUBLIC_KEY_LENGTH => {
                if bytes[0] != DJB_KEY_TYPE {
                    return Err(KeyError::BadKeyType(bytes[0]));
                }
                bytes[1..]
                    .try_into()
                    .map_err(|_| KeyError::BadPublicKeyLength(PUBLIC_KEY_LENGTH))?
            }
            other => return Err(KeyError::BadPublicKeyLength(other)),
        };
        Ok(PublicKey { point })
    }

    /// Returns the versioned 33-byte serialization.
    pub fn serialize(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        out[0] = DJB_KEY_TYPE;
        out[1..].copy_from_slice(&self.point);
        out
    }

    /// Returns the raw curve point without the type byte.
    pub fn point(&self) -> &[u8; 32] {
        &self.point
    }
}

impl TryFrom<Vec<u8>> for PublicKey {
    type Error = KeyError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        PublicKey::from_bytes(&bytes)
    }
}

impl From<PublicKey> for Vec<u8> {
    fn from(key: PublicKey) -> Self {
        key.serialize().to_vec()
    }
}

/// A Curve25519 private scalar.
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

impl PrivateKey {
    /// Parses a private key from exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let mut raw: [u8; PRIVATE_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| KeyError::BadPrivateKeyLength(bytes.len()))?;
        let secret = StaticSecret::from(raw);
        raw.zeroize();
        Ok(PrivateKey { secret })
    }

    /// Returns the raw scalar bytes (for persistence).
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LENGTH] {
        self.secret.to_bytes()
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            point: X25519PublicKey::from(&self.secret).to_bytes(),
        }
    }

    /// Computes the X25519 shared secret with a remote public key.
    pub fn agree(&self, remote: &PublicKey) -> Result<[u8; 32], KeyError> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(remote.point));
        if !shared.was_contributory() {
            return Err(KeyError::NonContributory);
        }
        Ok(shared.to_bytes())
    }
}

/// A Curve25519 key pair.
///
/// Used for identity agreement keys, prekeys, base keys and ratchet keys alike.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "KeyPairBytes", into = "KeyPairBytes")]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_private(PrivateKey { secret })
    }

    /// Builds a key pair from an existing private key.
    pub fn from_private(private_key: PrivateKey) -> Self {
        KeyPair {
            public_key: private_key.public_key(),
            private_key,
        }
    }

    /// Returns the public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the private half.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

/// Persisted form of a key pair.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyPairBytes {
    public: Vec<u8>,
    private: [u8; PRIVATE_KEY_LENGTH],
}

impl From<KeyPair> for KeyPairBytes {
    fn from(pair: KeyPair) -> Self {
        KeyPairBytes {
            public: pair.public_key.serialize().to_vec(),
            private: pair.private_key.to_bytes(),
        }
    }
}

impl TryFrom<KeyPairBytes> for KeyPair {
    type Error = KeyError;

    fn try_from(bytes: KeyPairBytes) -> Result<Self, Self::Error> {
        let pair = KeyPair::from_private(PrivateKey::from_bytes(&bytes.private)?);
        if pair.public_key != PublicKey::from_bytes(&bytes.public)? {
            return Err(KeyError::Invalid(
                "stored public key does not match private key".into(),
            ));
        }
        Ok(pair)
    }
}

/// Computes a shared secret from raw key bytes.
///
/// `local_private` must be 32 bytes. `remote_public` may be 32 raw bytes or
/// 33 bytes carrying the `0x05` type prefix, which is stripped.
pub fn calculate_agreement(local_private: &[u8], remote_public: &[u8]) -> Result<[u8; 32], KeyError> {
    let private = PrivateKey::from_bytes(local_private)?;
    let public = PublicKey::from_bytes(remote_public)?;
    private.agree(&public)
}
