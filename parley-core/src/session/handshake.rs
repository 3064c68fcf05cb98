// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Establishment
//!
//! X3DH-style handshake. The initiator combines its identity and a fresh
//! base key with the responder's identity, signed prekey and (optionally)
//! one-time prekey. The responder computes the same agreements in mirrored
//! order. Both feed the concatenation into the KDF to get the root key and
//! the first chain key.
//!
//! The concatenation order is part of the protocol. A mismatch produces no
//! error here, only keys that cannot decrypt anything.

use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::curve::{KeyError, KeyPair, PublicKey};
use crate::crypto::kdf::derive_keys;
use crate::keys::{IdentityKey, IdentityKeyPair};
use crate::ratchet::SessionState;

/// KDF info for the handshake secret.
const HANDSHAKE_INFO: &[u8] = b"ParleyText";

/// What the initiator knows when starting a session.
pub struct InitiatorParameters<'a> {
    pub our_identity: &'a IdentityKeyPair,
    pub our_base_key: KeyPair,
    pub their_identity: IdentityKey,
    pub their_signed_pre_key: PublicKey,
    pub their_one_time_pre_key: Option<PublicKey>,
}

/// What the responder knows when receiving a handshake message.
pub struct ResponderParameters<'a> {
    pub our_identity: &'a IdentityKeyPair,
    pub our_signed_pre_key: &'a KeyPair,
    pub our_one_time_pre_key: Option<&'a KeyPair>,
    pub their_identity: IdentityKey,
    pub their_base_key: PublicKey,
}

/// `DH(IK_a, SPK_b) || DH(EK_a, IK_b) || DH(EK_a, SPK_b) [|| DH(EK_a, OPK_b)]`
pub fn initiator_secret(params: &InitiatorParameters<'_>) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let identity = params.our_identity.agreement_key_pair().private_key();
    let base = params.our_base_key.private_key();

    let mut secret = Zeroizing::new(Vec::with_capacity(32 * 4));
    secret.extend_from_slice(&identity.agree(&params.their_signed_pre_key)?);
    secret.extend_from_slice(&base.agree(params.their_identity.agreement_key())?);
    secret.extend_from_slice(&base.agree(&params.their_signed_pre_key)?);
    if let Some(one_time) = &params.their_one_time_pre_key {
        secret.extend_from_slice(&base.agree(one_time)?);
    }
    Ok(secret)
}

/// `DH(SPK_b, IK_a) || DH(IK_b, EK_a) || DH(SPK_b, EK_a) [|| DH(OPK_b, EK_a)]`
pub fn responder_secret(params: &ResponderParameters<'_>) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let identity = params.our_identity.agreement_key_pair().private_key();
    let signed = params.our_signed_pre_key.private_key();

    let mut secret = Zeroizing::new(Vec::with_capacity(32 * 4));
    secret.extend_from_slice(&signed.agree(params.their_identity.agreement_key())?);
    secret.extend_from_slice(&identity.agree(&params.their_base_key)?);
    secret.extend_from_slice(&signed.agree(&params.their_base_key)?);
    if let Some(one_time) = params.our_one_time_pre_key {
        secret.extend_from_slice(&one_time.private_key().agree(&params.their_base_key)?);
    }
    Ok(secret)
}

/// Creates the initiator's session state. The initiator sends first, on the
/// chain stored under its base key.
pub fn initialize_initiator_session(
    params: InitiatorParameters<'_>,
) -> Result<SessionState, KeyError> {
    let secret = initiator_secret(&params)?;
    let (mut root_key, mut chain_key) = derive_keys(&secret, &[], HANDSHAKE_INFO);

    let base_key = *params.our_base_key.public_key();
    let state = SessionState::new(
        root_key,
        chain_key,
        base_key,
        params.their_signed_pre_key,
        params.our_base_key,
        params.their_signed_pre_key,
        params.their_identity,
    );
    root_key.zeroize();
    chain_key.zeroize();

    debug!(
        one_time_pre_key = params.their_one_time_pre_key.is_some(),
        "initialized initiator session"
    );
    Ok(state)
}

/// Creates the responder's session state. The responder's first ratchet key
/// is its signed prekey.
pub fn initialize_responder_session(
    params: ResponderParameters<'_>,
) -> Result<SessionState, KeyError> {
    let secret = responder_secret(&params)?;
    let (mut root_key, mut chain_key) = derive_keys(&secret, &[], HANDSHAKE_INFO);

    let signed_pre_key = *params.our_signed_pre_key.public_key();
    let state = SessionState::new(
        root_key,
        chain_key,
        params.their_base_key,
        signed_pre_key,
        params.our_signed_pre_key.clone(),
        params.their_base_key,
        params.their_identity,
    );
    root_key.zeroize();
    chain_key.zeroize();

    debug!(
        one_time_pre_key = params.our_one_time_pre_key.is_some(),
        "initialized responder session"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_roles_derive_same_root() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let signed = KeyPair::generate();
        let one_time = KeyPair::generate();
        let base = KeyPair::generate();

        let initiator = initialize_initiator_session(InitiatorParameters {
            our_identity: &alice,
            our_base_key: base.clone(),
            their_identity: bob.identity_key(),
            their_signed_pre_key: *signed.public_key(),
            their_one_time_pre_key: Some(*one_time.public_key()),
        })
        .unwrap();

        let responder = initialize_responder_session(ResponderParameters {
            our_identity: &bob,
            our_signed_pre_key: &signed,
            our_one_time_pre_key: Some(&one_time),
            their_identity: alice.identity_key(),
            their_base_key: *base.public_key(),
        })
        .unwrap();

        assert_eq!(initiator.root_key(), responder.root_key());
        assert_eq!(initiator.base_key(), responder.base_key());
        assert_eq!(initiator.ephemeral_public_key(), base.public_key());
        assert_eq!(responder.ephemeral_public_key(), signed.public_key());
    }
}
