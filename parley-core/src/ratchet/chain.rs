// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Chain Key Ratcheting
//!
//! Implements the symmetric ratchet. A chain key only moves forward: each
//! step derives one message key seed and replaces the chain key, so earlier
//! seeds cannot be recomputed from the current state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::kdf::{hmac_sha256, KEY_LENGTH};

/// Counter of a chain that has not produced any key yet.
pub const UNUSED_COUNTER: i64 = -1;

/// Counter of a placeholder chain that must never be advanced.
pub const PLACEHOLDER_COUNTER: i64 = u32::MAX as i64;

/// HMAC input deriving a message key seed.
const MESSAGE_KEY_SEED: &[u8] = &[0x01];
/// HMAC input deriving the next chain key.
const CHAIN_KEY_SEED: &[u8] = &[0x02];

/// Chain ratcheting error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Counter gap too large (current: {current}, requested: {requested}, max: {max})")]
    Overflow { current: i64, requested: u32, max: u32 },

    #[error("Message key {counter} was already used")]
    Duplicate { counter: u32 },

    #[error("Chain is closed at counter {current}, cannot reach {requested}")]
    Closed { current: i64, requested: u32 },

    #[error("Sending chain exhausted")]
    Exhausted,
}

/// A chain key: running secret plus the counter of the last derived key.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey {
    #[zeroize(skip)]
    counter: i64,
    /// `None` once the chain is closed (or for a placeholder).
    key: Option<[u8; KEY_LENGTH]>,
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("key", &self.key.map(|_| "[REDACTED]"))
            .field("counter", &self.counter)
            .finish()
    }
}

impl ChainKey {
    /// A fresh chain that has produced nothing yet.
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        ChainKey {
            counter: UNUSED_COUNTER,
            key: Some(key),
        }
    }

    /// A keyless chain treated as already fully advanced.
    pub fn placeholder() -> Self {
        ChainKey {
            counter: PLACEHOLDER_COUNTER,
            key: None,
        }
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn is_closed(&self) -> bool {
        self.key.is_none()
    }

    pub fn is_placeholder(&self) -> bool {
        self.key.is_none() && self.counter == PLACEHOLDER_COUNTER
    }

    /// Erases the chain key; existing message keys stay usable.
    pub fn close(&mut self) {
        self.key.zeroize();
        self.key = None;
    }
}

/// A chain key together with the message keys it has produced but that
/// have not been consumed yet.
#[derive(Clone, Serialize, Deserialize)]
pub struct Chain {
    chain_key: ChainKey,
    message_keys: BTreeMap<u32, [u8; KEY_LENGTH]>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("chain_key", &self.chain_key)
            .field("message_keys", &self.message_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        for seed in self.message_keys.values_mut() {
            seed.zeroize();
        }
    }
}

impl Chain {
    pub fn new(chain_key: ChainKey) -> Self {
        Chain {
            chain_key,
            message_keys: BTreeMap::new(),
        }
    }

    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    pub fn close(&mut self) {
        self.chain_key.close();
    }

    /// Number of derived, not yet consumed message keys.
    pub fn message_key_count(&self) -> usize {
        self.message_keys.len()
    }

    /// Whether the key for `counter` is still stored.
    pub fn has_message_key(&self, counter: u32) -> bool {
        self.message_keys.contains_key(&counter)
    }

    /// Advances the chain until its counter reaches `target`, storing every
    /// derived message key seed.
    ///
    /// A no-op when the counter is already at or beyond `target`. Refuses to
    /// derive more than `max_gap` keys in one call; in that case nothing is
    /// modified.
    pub fn fill_message_keys(&mut self, target: i64, max_gap: u32) -> Result<(), ChainError> {
        if self.chain_key.counter >= target {
            return Ok(());
        }
        // target > counter >= -1, so target fits in u32
        let requested = target as u32;
        if target - self.chain_key.counter > i64::from(max_gap) {
            return Err(ChainError::Overflow {
                current: self.chain_key.counter,
                requested,
                max: max_gap,
            });
        }
        let Some(mut key) = self.chain_key.key else {
            return Err(ChainError::Closed {
                current: self.chain_key.counter,
                requested,
            });
        };

        while self.chain_key.counter < target {
            let seed = hmac_sha256(&key, MESSAGE_KEY_SEED);
            let next = hmac_sha256(&key, CHAIN_KEY_SEED);
            self.chain_key.counter += 1;
            self.message_keys.insert(self.chain_key.counter as u32, seed);
            key.zeroize();
            key = next;
        }
        self.chain_key.key = Some(key);
        key.zeroize();

        Ok(())
    }

    /// Removes and returns the seed for `counter`, deriving forward first
    /// if the chain has not reached it yet.
    pub fn take_message_key(
        &mut self,
        counter: u32,
        max_gap: u32,
    ) -> Result<[u8; KEY_LENGTH], ChainError> {
        self.fill_message_keys(i64::from(counter), max_gap)?;
        self.message_keys
            .remove(&counter)
            .ok_or(ChainError::Duplicate { counter })
    }

    /// Advances a sending chain by one and returns `(counter, seed)`.
    pub fn next_sending_key(&mut self) -> Result<(u32, [u8; KEY_LENGTH]), ChainError> {
        let next = self.chain_key.counter + 1;
        if next >= PLACEHOLDER_COUNTER {
            return Err(ChainError::Exhausted);
        }
        let counter = next as u32;
        let seed = self.take_message_key(counter, 1)?;
        Ok((counter, seed))
    }
}

// INLINE_TEST_REQUIRED: Tests private seed constants and placeholder handling
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_matches_manual_derivation() {
        let mut chain = Chain::new(ChainKey::new([9u8; 32]));
        chain.fill_message_keys(1, 10).unwrap();

        let seed0 = hmac_sha256(&[9u8; 32], MESSAGE_KEY_SEED);
        let key1 = hmac_sha256(&[9u8; 32], CHAIN_KEY_SEED);
        let seed1 = hmac_sha256(&key1, MESSAGE_KEY_SEED);

        assert_eq!(chain.chain_key().counter(), 1);
        assert_eq!(chain.message_keys.get(&0), Some(&seed0));
        assert_eq!(chain.message_keys.get(&1), Some(&seed1));
    }

    #[test]
    fn test_fill_is_noop_when_already_advanced() {
        let mut chain = Chain::new(ChainKey::new([1u8; 32]));
        chain.fill_message_keys(3, 10).unwrap();
        let before = chain.chain_key.key;

        chain.fill_message_keys(2, 10).unwrap();

        assert_eq!(chain.chain_key().counter(), 3);
        assert_eq!(chain.chain_key.key, before);
    }

    #[test]
    fn test_overflow_leaves_chain_untouched() {
        let mut chain = Chain::new(ChainKey::new([1u8; 32]));

        let result = chain.fill_message_keys(2000, 2000);
        assert!(matches!(result, Err(ChainError::Overflow { .. })));
        assert_eq!(chain.chain_key().counter(), UNUSED_COUNTER);
        assert_eq!(chain.message_key_count(), 0);

        // -1 -> 1999 is exactly 2000 steps
        assert!(chain.fill_message_keys(1999, 2000).is_ok());
    }

    #[test]
    fn test_consumed_key_is_duplicate() {
        let mut chain = Chain::new(ChainKey::new([1u8; 32]));

        chain.take_message_key(0, 10).unwrap();
        assert_eq!(
            chain.take_message_key(0, 10),
            Err(ChainError::Duplicate { counter: 0 })
        );
    }

    #[test]
    fn test_placeholder_never_advances() {
        let mut chain = Chain::new(ChainKey::placeholder());

        assert!(chain.fill_message_keys(5, 10).is_ok());
        assert_eq!(chain.message_key_count(), 0);
        assert_eq!(
            chain.take_message_key(5, 10),
            Err(ChainError::Duplicate { counter: 5 })
        );
        assert_eq!(chain.next_sending_key(), Err(ChainError::Exhausted));
    }

    #[test]
    fn test_closed_chain_keeps_stored_keys() {
        let mut chain = Chain::new(ChainKey::new([1u8; 32]));
        chain.fill_message_keys(2, 10).unwrap();
        chain.close();

        assert!(chain.take_message_key(1, 10).is_ok());
        assert!(matches!(
            chain.take_message_key(3, 10),
            Err(ChainError::Closed { .. })
        ));
    }

    #[test]
    fn test_sending_keys_are_sequential() {
        let mut chain = Chain::new(ChainKey::new([4u8; 32]));

        let (c0, k0) = chain.next_sending_key().unwrap();
        let (c1, k1) = chain.next_sending_key().unwrap();

        assert_eq!((c0, c1), (0, 1));
        assert_ne!(k0, k1);
        assert_eq!(chain.message_key_count(), 0);
    }
}
