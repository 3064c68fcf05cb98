// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Diffie-Hellman Ratchet
//!
//! Rotation happens in two halves. Receiving a message under an unknown
//! remote ephemeral key runs the receive half ([`maybe_step`]): the previous
//! remote chain is filled and retired, our spent sending chain is dropped and
//! a receive chain is derived from `DH(our current key, their new key)`.
//! The sending half ([`step_sending`]) generates our next key pair and
//! derives a sending chain from it; it runs when we next encrypt.
//!
//! Both parties therefore hold the same root key after every decrypted
//! message, which is what lets a session heal after a key compromise.

use tracing::debug;
use zeroize::Zeroize;

use super::chain::{Chain, ChainKey};
use super::state::{RetiredChain, SessionState};
use crate::config::ProtocolConfig;
use crate::crypto::curve::{KeyPair, PublicKey};
use crate::crypto::kdf::derive_keys;
use crate::error::ProtocolError;

/// KDF info for root key ratcheting.
const RATCHET_INFO: &[u8] = b"ParleyRatchet";

/// Runs the receive half of a DH ratchet step if `remote` is a new key.
///
/// `previous_counter` is the last counter the peer used on its previous
/// sending chain; every key up to it is derived before that chain is
/// retired so late messages stay decryptable.
pub fn maybe_step(
    state: &mut SessionState,
    remote: &PublicKey,
    previous_counter: u32,
    config: &ProtocolConfig,
    now: u64,
) -> Result<(), ProtocolError> {
    if state.chains.contains_key(remote) {
        return Ok(());
    }

    let last_remote = state.last_remote_ephemeral_key;
    if let Some(chain) = state.chains.get_mut(&last_remote) {
        chain.fill_message_keys(i64::from(previous_counter), config.max_message_key_gap)?;
        chain.close();

        if chain.message_key_count() == 0 {
            state.chains.remove(&last_remote);
        } else {
            state.old_chains.push_back(RetiredChain {
                ephemeral_key: last_remote,
                retired_at: now,
            });
            debug!(
                archived = state.old_chains.len(),
                "retired receive chain with pending message keys"
            );
        }
    }

    while state.old_chains.len() > config.max_archived_chains {
        if let Some(oldest) = state.old_chains.pop_front() {
            state.chains.remove(&oldest.ephemeral_key);
            debug!(
                retired_at = oldest.retired_at,
                "dropped oldest retired chain"
            );
        }
    }

    let ours = *state.ephemeral_key_pair.public_key();
    if let Some(spent) = state.chains.remove(&ours) {
        let key = spent.chain_key();
        if !key.is_placeholder() {
            state.previous_counter = key.counter().max(0) as u32;
        }
    }

    let mut secret = state.ephemeral_key_pair.private_key().agree(remote)?;
    let (root_key, receive_key) = derive_keys(&secret, &state.root_key, RATCHET_INFO);
    secret.zeroize();

    state.root_key = root_key;
    state.chains.insert(*remote, Chain::new(ChainKey::new(receive_key)));
    state.last_remote_ephemeral_key = *remote;

    debug!(chains = state.chains.len(), "ratchet receive step");
    Ok(())
}

/// Runs the sending half of a ratchet step if our current key pair has no
/// usable sending chain.
pub fn step_sending(state: &mut SessionState) -> Result<(), ProtocolError> {
    let ours = *state.ephemeral_key_pair.public_key();
    match state.chains.get(&ours).map(|c| c.chain_key().is_closed()) {
        Some(false) => return Ok(()),
        // a responder's signed prekey placeholder
        Some(true) => {
            state.chains.remove(&ours);
        }
        None => {}
    }

    let key_pair = KeyPair::generate();
    let mut secret = key_pair
        .private_key()
        .agree(&state.last_remote_ephemeral_key)?;
    let (root_key, send_key) = derive_keys(&secret, &state.root_key, RATCHET_INFO);
    secret.zeroize();

    state.root_key = root_key;
    state
        .chains
        .insert(*key_pair.public_key(), Chain::new(ChainKey::new(send_key)));
    state.ephemeral_key_pair = key_pair;

    debug!(chains = state.chains.len(), "ratchet sending step");
    Ok(())
}
