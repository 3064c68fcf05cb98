// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-Message Cipher
//!
//! Each message key seed is expanded into an AES-256-CTR key and an
//! HMAC-SHA256 key. The MAC is truncated to 8 bytes and always checked
//! (in constant time) before any decryption happens.

use aes::cipher::{KeyIvInit, StreamCipher};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::kdf::{derive_keys, hmac_sha256, KEY_LENGTH};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Length of the truncated message MAC.
pub const MAC_LENGTH: usize = 8;

/// KDF info for expanding a message key seed.
const MESSAGE_KEYS_INFO: &[u8] = b"ParleyMessageKeys";

/// Cipher and MAC keys for a single message.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKeys {
    cipher_key: [u8; KEY_LENGTH],
    mac_key: [u8; KEY_LENGTH],
    #[zeroize(skip)]
    counter: u32,
}

impl std::fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKeys")
            .field("keys", &"[REDACTED]")
            .field("counter", &self.counter)
            .finish()
    }
}

impl MessageKeys {
    /// Expands a message key seed taken from a chain.
    pub fn derive(seed: &[u8; KEY_LENGTH], counter: u32) -> Self {
        let (cipher_key, mac_key) = derive_keys(seed, &[], MESSAGE_KEYS_INFO);
        MessageKeys {
            cipher_key,
            mac_key,
            counter,
        }
    }

    /// The message counter these keys belong to.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Encrypts or decrypts `data` in place (CTR mode is symmetric).
    ///
    /// The counter block is `counter (u32 BE) || 12 zero bytes`.
    pub fn apply_keystream(&self, data: &mut [u8]) {
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&self.counter.to_be_bytes());

        let mut cipher = Aes256Ctr::new((&self.cipher_key).into(), (&iv).into());
        cipher.apply_keystream(data);
    }

    /// Computes the truncated MAC over `data`.
    pub fn mac(&self, data: &[u8]) -> [u8; MAC_LENGTH] {
        let mut full = hmac_sha256(&self.mac_key, data);
        let mut tag = [0u8; MAC_LENGTH];
        tag.copy_from_slice(&full[..MAC_LENGTH]);
        full.zeroize();
        tag
    }

    /// Checks a received MAC in constant time.
    pub fn verify_mac(&self, data: &[u8], their_mac: &[u8]) -> bool {
        let ours = self.mac(data);
        their_mac.len() == MAC_LENGTH && bool::from(ours[..].ct_eq(their_mac))
    }
}
