// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire Messages
//!
//! Layouts (all integers big-endian):
//!
//! ```text
//! WireMessage:       version(1) | ephemeral(33) | counter(4) | previous_counter(4)
//!                    | ciphertext(..) | mac(8)
//! PreKeyWireMessage: version(1) | has_pre_key(1) | pre_key_id(4) | signed_pre_key_id(4)
//!                    | base_key(33) | identity_key(65) | WireMessage
//! ```
//!
//! The MAC covers every byte of a `WireMessage` before the MAC itself.

use super::CodecError;
use crate::config::{VersionPolicy, CURRENT_MAJOR_VERSION, CURRENT_MINOR_VERSION};
use crate::crypto::cipher::{MessageKeys, MAC_LENGTH};
use crate::crypto::curve::{PublicKey, DJB_KEY_TYPE, PUBLIC_KEY_LENGTH};
use crate::keys::{IdentityKey, IDENTITY_KEY_LENGTH};

/// Version byte written by this implementation.
pub const CURRENT_VERSION: u8 = (CURRENT_MAJOR_VERSION << 4) | CURRENT_MINOR_VERSION;

const HEADER_LENGTH: usize = 1 + PUBLIC_KEY_LENGTH + 4 + 4;

/// Smallest valid `WireMessage` (empty ciphertext).
pub const MIN_WIRE_MESSAGE_LENGTH: usize = HEADER_LENGTH + MAC_LENGTH;

const PRE_KEY_HEADER_LENGTH: usize = 1 + 1 + 4 + 4 + PUBLIC_KEY_LENGTH + IDENTITY_KEY_LENGTH;

/// Smallest valid `PreKeyWireMessage`.
pub const MIN_PRE_KEY_MESSAGE_LENGTH: usize = PRE_KEY_HEADER_LENGTH + MIN_WIRE_MESSAGE_LENGTH;

/// Transport-level tag for a serialized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Whisper = 2,
    PreKey = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(MessageType::Whisper),
            3 => Ok(MessageType::PreKey),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

fn check_version(version: u8, policy: &VersionPolicy) -> Result<(), CodecError> {
    if policy.accepts(version) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedVersion(version))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

fn read_public_key(bytes: &[u8]) -> Result<PublicKey, CodecError> {
    if bytes[0] != DJB_KEY_TYPE {
        return Err(CodecError::BadKeyType(bytes[0]));
    }
    PublicKey::from_bytes(&bytes[..PUBLIC_KEY_LENGTH]).map_err(CodecError::InvalidKey)
}

/// An encrypted ratchet message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    version: u8,
    ephemeral_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
    mac: [u8; MAC_LENGTH],
    serialized: Vec<u8>,
}

impl WireMessage {
    /// Builds and authenticates a message with `keys`.
    pub fn new(
        version: u8,
        ephemeral_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
        keys: &MessageKeys,
    ) -> Self {
        let mut serialized = Vec::with_capacity(HEADER_LENGTH + ciphertext.len() + MAC_LENGTH);
        serialized.push(version);
        serialized.extend_from_slice(&ephemeral_key.serialize());
        serialized.extend_from_slice(&counter.to_be_bytes());
        serialized.extend_from_slice(&previous_counter.to_be_bytes());
        serialized.extend_from_slice(&ciphertext);

        let mac = keys.mac(&serialized);
        serialized.extend_from_slice(&mac);

        WireMessage {
            version,
            ephemeral_key,
            counter,
            previous_counter,
            ciphertext,
            mac,
            serialized,
        }
    }

    /// Parses a message, rejecting versions the policy does not accept.
    pub fn decode(bytes: &[u8], policy: &VersionPolicy) -> Result<Self, CodecError> {
        if bytes.len() < MIN_WIRE_MESSAGE_LENGTH {
            return Err(CodecError::TooShort {
                expected: MIN_WIRE_MESSAGE_LENGTH,
                actual: bytes.len(),
            });
        }
        let version = bytes[0];
        check_version(version, policy)?;

        let ephemeral_key = read_public_key(&bytes[1..])?;
        let counter = read_u32(&bytes[1 + PUBLIC_KEY_LENGTH..]);
        let previous_counter = read_u32(&bytes[1 + PUBLIC_KEY_LENGTH + 4..]);

        let mac_start = bytes.len() - MAC_LENGTH;
        let mut mac = [0u8; MAC_LENGTH];
        mac.copy_from_slice(&bytes[mac_start..]);

        Ok(WireMessage {
            version,
            ephemeral_key,
            counter,
            previous_counter,
            ciphertext: bytes[HEADER_LENGTH..mac_start].to_vec(),
            mac,
            serialized: bytes.to_vec(),
        })
    }

    /// Checks the truncated MAC in constant time.
    pub fn verify_mac(&self, keys: &MessageKeys) -> bool {
        let mac_start = self.serialized.len() - MAC_LENGTH;
        keys.verify_mac(&self.serialized[..mac_start], &self.mac)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn ephemeral_key(&self) -> &PublicKey {
        &self.ephemeral_key
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn mac(&self) -> &[u8; MAC_LENGTH] {
        &self.mac
    }

    pub fn serialize(&self) -> &[u8] {
        &self.serialized
    }
}

/// A ratchet message carrying the handshake fields that let the recipient
/// create the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyWireMessage {
    version: u8,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
    identity_key: IdentityKey,
    message: WireMessage,
    serialized: Vec<u8>,
}

impl PreKeyWireMessage {
    pub fn new(
        version: u8,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: PublicKey,
        identity_key: IdentityKey,
        message: WireMessage,
    ) -> Self {
        let mut serialized =
            Vec::with_capacity(PRE_KEY_HEADER_LENGTH + message.serialize().len());
        serialized.push(version);
        serialized.push(u8::from(pre_key_id.is_some()));
        serialized.extend_from_slice(&pre_key_id.unwrap_or(0).to_be_bytes());
        serialized.extend_from_slice(&signed_pre_key_id.to_be_bytes());
        serialized.extend_from_slice(&base_key.serialize());
        serialized.extend_from_slice(&identity_key.serialize());
        serialized.extend_from_slice(message.serialize());

        PreKeyWireMessage {
            version,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized,
        }
    }

    pub fn decode(bytes: &[u8], policy: &VersionPolicy) -> Result<Self, CodecError> {
        if bytes.len() < MIN_PRE_KEY_MESSAGE_LENGTH {
            return Err(CodecError::TooShort {
                expected: MIN_PRE_KEY_MESSAGE_LENGTH,
                actual: bytes.len(),
            });
        }
        let version = bytes[0];
        check_version(version, policy)?;

        let pre_key_id = match bytes[1] {
            0 => None,
            1 => Some(read_u32(&bytes[2..])),
            flag => return Err(CodecError::BadFlag(flag)),
        };
        let signed_pre_key_id = read_u32(&bytes[6..]);

        let mut offset = 10;
        let base_key = read_public_key(&bytes[offset..])?;
        offset += PUBLIC_KEY_LENGTH;
        let identity_key = IdentityKey::from_bytes(&bytes[offset..offset + IDENTITY_KEY_LENGTH])
            .map_err(CodecError::InvalidKey)?;
        offset += IDENTITY_KEY_LENGTH;

        let message = WireMessage::decode(&bytes[offset..], policy)?;

        Ok(PreKeyWireMessage {
            version,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
            serialized: bytes.to_vec(),
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn message(&self) -> &WireMessage {
        &self.message
    }

    pub fn serialize(&self) -> &[u8] {
        &self.serialized
    }
}

/// Either kind of outgoing or incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiphertextMessage {
    Whisper(WireMessage),
    PreKey(PreKeyWireMessage),
}

impl CiphertextMessage {
    /// Parses bytes received together with their transport tag.
    pub fn decode(
        message_type: MessageType,
        bytes: &[u8],
        policy: &VersionPolicy,
    ) -> Result<Self, CodecError> {
        match message_type {
            MessageType::Whisper => WireMessage::decode(bytes, policy).map(Self::Whisper),
            MessageType::PreKey => PreKeyWireMessage::decode(bytes, policy).map(Self::PreKey),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            CiphertextMessage::Whisper(_) => MessageType::Whisper,
            CiphertextMessage::PreKey(_) => MessageType::PreKey,
        }
    }

    pub fn serialize(&self) -> &[u8] {
        match self {
            CiphertextMessage::Whisper(m) => m.serialize(),
            CiphertextMessage::PreKey(m) => m.serialize(),
        }
    }
}
