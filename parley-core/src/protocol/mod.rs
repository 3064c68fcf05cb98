// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Message Codec
//!
//! Binary encoding of ratchet messages and the handshake envelope.

pub mod message;

use thiserror::Error;

use crate::crypto::curve::KeyError;

pub use message::{
    CiphertextMessage, MessageType, PreKeyWireMessage, WireMessage, CURRENT_VERSION,
    MIN_PRE_KEY_MESSAGE_LENGTH, MIN_WIRE_MESSAGE_LENGTH,
};

/// Message decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Unsupported version byte {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("Unknown key type byte {0:#04x}")]
    BadKeyType(u8),

    #[error("Invalid flag byte {0:#04x}")]
    BadFlag(u8),

    #[error("Unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("Invalid key: {0}")]
    InvalidKey(KeyError),
}
