//! Monitored host definition.

use serde::{Deserialize, Serialize};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Bytes in one tebibyte, the unit quotas are written in
pub const TIB: u64 = 1024 * 1024 * 1024 * 1024;

/// A monitored relay host
///
/// Hosts are loaded once at startup and never change afterwards. The name is
/// the unique key used by the registry, the offset table and the history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Unique display name
    pub name: String,
    /// Network address (hostname or IP)
    #[serde(alias = "host")]
    pub address: String,
    /// Login principal
    #[serde(alias = "username")]
    pub user: String,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Monthly upload quota in bytes; `None` disables enforcement
    #[serde(
        default,
        alias = "bandwidthLimit",
        alias = "bandwidth_limit",
        skip_serializing_if = "Option::is_none"
    )]
    pub quota_bytes: Option<u64>,
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Host {
    /// Creates a host on the default SSH port without a quota
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            quota_bytes: None,
        }
    }

    /// Sets the monthly upload quota in bytes
    #[must_use]
    pub const fn with_quota(mut self, bytes: u64) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    /// Sets the SSH port
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns `user@address`
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Converts a quota given in TiB to bytes
    #[must_use]
    pub fn quota_from_tib(tib: f64) -> u64 {
        if tib.is_finite() && tib > 0.0 {
            (tib * TIB as f64).round() as u64
        } else {
            0
        }
    }
}
