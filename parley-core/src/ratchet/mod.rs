// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ratchet Module
//!
//! The symmetric chain ratchet, the Diffie-Hellman ratchet and the session
//! state they advance.

pub mod chain;
pub mod dh;
pub mod state;

pub use chain::{Chain, ChainError, ChainKey, PLACEHOLDER_COUNTER, UNUSED_COUNTER};
pub use dh::{maybe_step, step_sending};
pub use state::{PendingPreKey, RetiredChain, SessionState};
