// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key Derivation
//!
//! HMAC-SHA256 and the fixed two-output HKDF used throughout the protocol.
//! Every derivation needs exactly two 32-byte keys, so the expand step is
//! unrolled to two blocks instead of taking an output length.

use ring::hmac;

/// Length of every symmetric key produced by this module.
pub const KEY_LENGTH: usize = 32;

/// Computes HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; KEY_LENGTH] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, data);

    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(tag.as_ref());
    out
}

/// Derives two 32-byte keys from input key material.
///
/// - `PRK = HMAC(salt, ikm)`, with an empty salt replaced by 32 zero bytes
/// - `T1 = HMAC(PRK, info || 0x01)`
/// - `T2 = HMAC(PRK, T1 || info || 0x02)`
///
/// The result is identical to the first 64 bytes of RFC 5869 HKDF-SHA256.
pub fn derive_keys(ikm: &[u8], salt: &[u8], info: &[u8]) -> ([u8; KEY_LENGTH], [u8; KEY_LENGTH]) {
    let zero_salt = [0u8; KEY_LENGTH];
    let salt = if salt.is_empty() { &zero_salt[..] } else { salt };

    let prk = hmac::Key::new(hmac::HMAC_SHA256, &hmac_sha256(salt, ikm));

    let mut ctx = hmac::Context::with_key(&prk);
    ctx.update(info);
    ctx.update(&[0x01]);
    let mut t1 = [0u8; KEY_LENGTH];
    t1.copy_from_slice(ctx.sign().as_ref());

    let mut ctx = hmac::Context::with_key(&prk);
    ctx.update(&t1);
    ctx.update(info);
    ctx.update(&[0x02]);
    let mut t2 = [0u8; KEY_LENGTH];
    t2.copy_from_slice(ctx.sign().as_ref());

    (t1, t2)
}
