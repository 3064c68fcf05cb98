//! Configuration for the session protocol

use std::time::Duration;

/// Current wire protocol major version.
pub const CURRENT_MAJOR_VERSION: u8 = 3;

/// Current wire protocol minor version.
pub const CURRENT_MINOR_VERSION: u8 = 3;

/// Which wire versions a receiver accepts.
///
/// The version byte is `(major << 4) | minor`. A different major version is
/// always rejected. A minor version other than the one we speak is rejected
/// unless `tolerate_unknown_minor` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    pub major: u8,
    pub tolerate_unknown_minor: bool,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            major: CURRENT_MAJOR_VERSION,
            tolerate_unknown_minor: false,
        }
    }
}

impl VersionPolicy {
    /// Accept any minor version of the configured major.
    pub fn tolerant() -> Self {
        Self {
            tolerate_unknown_minor: true,
            ..Self::default()
        }
    }

    /// Whether a message with this version byte may be processed.
    pub fn accepts(&self, version: u8) -> bool {
        let major = version >> 4;
        let minor = version & 0x0F;
        if major != self.major {
            return false;
        }
        minor == CURRENT_MINOR_VERSION || self.tolerate_unknown_minor
    }
}

/// Configuration for a [`SessionProtocol`](crate::session::SessionProtocol)
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Most message keys derived for a single received message
    pub max_message_key_gap: u32,

    /// Most retired receive chains kept per session
    pub max_archived_chains: usize,

    /// Accepted wire versions
    pub version_policy: VersionPolicy,

    /// How long a superseded signed prekey stays usable
    pub signed_pre_key_grace_period: Duration,

    /// Suggested number of one-time prekeys per upload
    pub pre_key_batch_size: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message_key_gap: 2000,
            max_archived_chains: 5,
            version_policy: VersionPolicy::default(),
            signed_pre_key_grace_period: Duration::from_secs(30 * 24 * 3600), // 30 days
            pre_key_batch_size: 100,
        }
    }
}

impl ProtocolConfig {
    /// Set the per-message derivation cap
    pub fn with_max_message_key_gap(mut self, gap: u32) -> Self {
        self.max_message_key_gap = gap;
        self
    }

    /// Set how many retired chains are kept
    pub fn with_max_archived_chains(mut self, count: usize) -> Self {
        self.max_archived_chains = count;
        self
    }

    /// Set the accepted wire versions
    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }

    /// Set the signed prekey grace window
    pub fn with_signed_pre_key_grace_period(mut self, grace: Duration) -> Self {
        self.signed_pre_key_grace_period = grace;
        self
    }

    /// Set the prekey upload batch size
    pub fn with_pre_key_batch_size(mut self, size: u32) -> Self {
        self.pre_key_batch_size = size;
        self
    }
}
