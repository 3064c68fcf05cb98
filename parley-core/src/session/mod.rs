// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Module
//!
//! Handshake, addressing and the protocol entry points that tie the ratchet,
//! the codec and the key store together.

pub mod address;
pub mod cipher;
pub mod handshake;

pub use address::SessionAddress;
pub use cipher::SessionProtocol;
pub use handshake::{
    initialize_initiator_session, initialize_responder_session, initiator_secret,
    responder_secret, InitiatorParameters, ResponderParameters,
};
