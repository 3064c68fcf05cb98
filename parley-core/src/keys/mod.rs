// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Lifecycle
//!
//! Identity keys, one-time prekeys, signed prekeys and the registration
//! surface callers use to create and publish them.

pub mod identity;
pub mod prekeys;

pub use identity::{IdentityKey, IdentityKeyPair, IDENTITY_KEY_LENGTH};
pub use prekeys::{
    generate_identity_key_pair, generate_last_resort_pre_key, generate_pre_keys,
    generate_signed_pre_key, prune_signed_pre_keys, signed_pre_keys_to_prune, PreKeyBundle,
    PreKeyRecord, SignedPreKeyRecord, LAST_RESORT_PRE_KEY_ID, MAX_PRE_KEY_ID,
};
