// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cryptographic primitives. Everything here is stateless.

pub mod cipher;
pub mod curve;
pub mod encryption;
pub mod kdf;
pub mod signing;

pub use cipher::{MessageKeys, MAC_LENGTH};
pub use curve::{calculate_agreement, KeyError, KeyPair, PrivateKey, PublicKey, PUBLIC_KEY_LENGTH};
pub use encryption::{open, seal, SealError, SymmetricKey, MIN_SEALED_LENGTH};
pub use kdf::{derive_keys, hmac_sha256, KEY_LENGTH};
pub use signing::{Signature, SigningKeyPair, VerifyingKey};
