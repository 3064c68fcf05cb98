//! Parley Core Library
//!
//! End-to-end encrypted sessions between devices: an X3DH-style handshake
//! over published prekeys, a Diffie-Hellman ratchet combined with a
//! symmetric chain ratchet, and AES-256-CTR messages authenticated with a
//! truncated HMAC-SHA256.
//! Hashing, signatures and randomness use the audited `ring` crate.

pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod ratchet;
pub mod session;
pub mod storage;

pub use config::{ProtocolConfig, VersionPolicy};
pub use crypto::{KeyPair, PrivateKey, PublicKey, SymmetricKey};
pub use error::ProtocolError;
pub use keys::{
    generate_identity_key_pair, generate_last_resort_pre_key, generate_pre_keys,
    generate_signed_pre_key, prune_signed_pre_keys, signed_pre_keys_to_prune, IdentityKey,
    IdentityKeyPair, PreKeyBundle, PreKeyRecord, SignedPreKeyRecord, LAST_RESORT_PRE_KEY_ID,
};
pub use protocol::{
    CiphertextMessage, CodecError, MessageType, PreKeyWireMessage, WireMessage, CURRENT_VERSION,
    MIN_PRE_KEY_MESSAGE_LENGTH, MIN_WIRE_MESSAGE_LENGTH,
};
pub use ratchet::SessionState;
pub use session::{SessionAddress, SessionProtocol};
pub use storage::{KeyStore, MemoryKeyStore, SqliteKeyStore, StorageError};

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
