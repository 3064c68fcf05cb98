// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session State
//!
//! Everything one side of a conversation needs to keep between messages:
//! the root key, our current ratchet key pair, the chains keyed by the
//! ephemeral public key that created them, and the registry of retired
//! chains that may still receive late messages.
//!
//! A `SessionState` is a plain value. Protocol operations clone it, mutate
//! the clone and hand it back to the key store only when the whole step
//! succeeded.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::{HashMap, VecDeque};
use zeroize::Zeroize;

use super::chain::{Chain, ChainError, ChainKey};
use crate::crypto::curve::{KeyPair, PublicKey};
use crate::crypto::kdf::KEY_LENGTH;
use crate::keys::IdentityKey;

/// A receive chain that is no longer current but still holds message keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredChain {
    pub ephemeral_key: PublicKey,
    /// Unix timestamp (seconds) of retirement.
    pub retired_at: u64,
}

/// Handshake fields an initiator repeats until the responder answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    pub pre_key_id: Option<u32>,
    pub signed_pre_key_id: u32,
    pub base_key: PublicKey,
}

/// Ratchet state for one remote device.
#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub(super) root_key: [u8; KEY_LENGTH],
    pub(super) ephemeral_key_pair: KeyPair,
    pub(super) last_remote_ephemeral_key: PublicKey,
    /// Last counter of our previous sending chain, announced in every message.
    pub(super) previous_counter: u32,
    #[serde_as(as = "Vec<(_, _)>")]
    pub(super) chains: HashMap<PublicKey, Chain>,
    /// Oldest first.
    pub(super) old_chains: VecDeque<RetiredChain>,
    pub(super) remote_identity: IdentityKey,
    /// Initiator base key identifying the handshake that created the session.
    pub(super) base_key: PublicKey,
    pub(super) pending_pre_key: Option<PendingPreKey>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("ephemeral_key", self.ephemeral_key_pair.public_key())
            .field("last_remote_ephemeral_key", &self.last_remote_ephemeral_key)
            .field("previous_counter", &self.previous_counter)
            .field("chains", &self.chains.len())
            .field("old_chains", &self.old_chains.len())
            .field("remote_identity", &self.remote_identity)
            .field("pending_pre_key", &self.pending_pre_key.is_some())
            .finish()
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

impl SessionState {
    /// Builds the state both handshake roles start from.
    ///
    /// The first chain lives under the initiator's base key and the
    /// responder's signed prekey gets a placeholder chain, so that the first
    /// message from either ephemeral is recognized as belonging to a known
    /// chain.
    pub(crate) fn new(
        root_key: [u8; KEY_LENGTH],
        first_chain_key: [u8; KEY_LENGTH],
        base_key: PublicKey,
        signed_pre_key: PublicKey,
        ephemeral_key_pair: KeyPair,
        last_remote_ephemeral_key: PublicKey,
        remote_identity: IdentityKey,
    ) -> Self {
        let mut chains = HashMap::new();
        chains.insert(base_key, Chain::new(ChainKey::new(first_chain_key)));
        chains.insert(signed_pre_key, Chain::new(ChainKey::placeholder()));

        SessionState {
            root_key,
            ephemeral_key_pair,
            last_remote_ephemeral_key,
            previous_counter: 0,
            chains,
            old_chains: VecDeque::new(),
            remote_identity,
            base_key,
            pending_pre_key: None,
        }
    }

    pub fn root_key(&self) -> &[u8; KEY_LENGTH] {
        &self.root_key
    }

    /// Our current ratchet public key.
    pub fn ephemeral_public_key(&self) -> &PublicKey {
        self.ephemeral_key_pair.public_key()
    }

    pub fn last_remote_ephemeral_key(&self) -> &PublicKey {
        &self.last_remote_ephemeral_key
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    pub(crate) fn set_pending_pre_key(&mut self, pending: PendingPreKey) {
        self.pending_pre_key = Some(pending);
    }

    /// Called once the remote side has provably received our handshake.
    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    pub fn chain(&self, ephemeral_key: &PublicKey) -> Option<&Chain> {
        self.chains.get(ephemeral_key)
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Retired chains, oldest first.
    pub fn old_chains(&self) -> impl Iterator<Item = &RetiredChain> {
        self.old_chains.iter()
    }

    /// Whether the message key for `counter` on `ephemeral_key` is stored.
    pub fn has_message_key(&self, ephemeral_key: &PublicKey, counter: u32) -> bool {
        self.chains
            .get(ephemeral_key)
            .is_some_and(|chain| chain.has_message_key(counter))
    }

    /// Total number of derived, unconsumed message keys across all chains.
    pub fn stored_message_key_count(&self) -> usize {
        self.chains.values().map(Chain::message_key_count).sum()
    }

    /// Takes the message key for a received message.
    ///
    /// Callers must have run the DH ratchet for `ephemeral_key` first.
    pub(crate) fn take_receiving_key(
        &mut self,
        ephemeral_key: &PublicKey,
        counter: u32,
        max_gap: u32,
    ) -> Result<[u8; KEY_LENGTH], ChainError> {
        match self.chains.get_mut(ephemeral_key) {
            Some(chain) => chain.take_message_key(counter, max_gap),
            None => Err(ChainError::Closed {
                current: -1,
                requested: counter,
            }),
        }
    }

    /// Advances our sending chain by one, returning `(counter, seed)`.
    pub(crate) fn next_sending_key(&mut self) -> Result<(u32, [u8; KEY_LENGTH]), ChainError> {
        let ours = *self.ephemeral_key_pair.public_key();
        match self.chains.get_mut(&ours) {
            Some(chain) => chain.next_sending_key(),
            None => Err(ChainError::Exhausted),
        }
    }
}
