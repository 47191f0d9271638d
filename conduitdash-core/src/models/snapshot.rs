//! Per-poll status snapshots and their display form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used for byte quantities that could not be parsed
pub const ZERO_BYTES: &str = "0 B";

/// Placeholder used when no uptime was reported
pub const UPTIME_UNKNOWN: &str = "N/A";

/// Service state of a monitored host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Not yet classified
    Unknown,
    /// No known marker in the status output
    #[default]
    Offline,
    /// The service unit is inactive or dead
    Stopped,
    /// The service unit is active
    Running,
    /// The service reported a successful network connection
    Connected,
    /// The host could not be polled
    Error,
}

impl ServiceStatus {
    /// Returns the status as a lowercase string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Returns true if the service is up (running or connected)
    #[must_use]
    pub const fn is_up(&self) -> bool {
        matches!(self, Self::Running | Self::Connected)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "offline" => Ok(Self::Offline),
            "stopped" => Ok(Self::Stopped),
            "running" => Ok(Self::Running),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Parsed status of one host at one poll
///
/// Byte quantities are session-scoped and kept as the text the host printed;
/// the codec turns them into numbers during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Host name
    pub host: String,
    /// Classified service state
    pub status: ServiceStatus,
    /// Connected clients
    pub clients: u32,
    /// Clients still connecting (newer metrics format only)
    pub connecting: u32,
    /// Session-scoped upload, as printed
    pub upload: String,
    /// Session-scoped download, as printed
    pub download: String,
    /// Uptime text
    pub uptime: String,
    /// Failure description when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Snapshot {
    /// Creates an empty snapshot: offline, zero metrics, unknown uptime
    #[must_use]
    pub fn empty(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: ServiceStatus::Offline,
            clients: 0,
            connecting: 0,
            upload: ZERO_BYTES.to_string(),
            download: ZERO_BYTES.to_string(),
            uptime: UPTIME_UNKNOWN.to_string(),
            error: None,
        }
    }

    /// Creates a degraded snapshot for a host that could not be polled
    #[must_use]
    pub fn failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Error,
            error: Some(error.into()),
            ..Self::empty(host)
        }
    }

    /// Returns true if this snapshot records a poll failure
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ServiceStatus::Error
    }
}

/// Display values for one host after reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    /// Host name
    pub name: String,
    /// Classified service state
    pub status: ServiceStatus,
    /// Connected clients
    pub clients: u32,
    /// Clients still connecting
    pub connecting: u32,
    /// Cumulative upload in bytes
    pub upload_bytes: u64,
    /// Cumulative download in bytes
    pub download_bytes: u64,
    /// Human-readable cumulative upload
    pub upload: String,
    /// Human-readable cumulative download
    pub download: String,
    /// Uptime text
    pub uptime: String,
    /// Monthly quota in bytes, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<u64>,
    /// Failure description when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one fetch over the whole fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStats {
    /// When the aggregate was computed
    pub computed_at: DateTime<Utc>,
    /// One entry per configured host, in configuration order
    pub hosts: Vec<HostStats>,
}

impl FleetStats {
    /// Returns the entry for a host
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostStats> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Returns the number of hosts that could not be polled
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.status == ServiceStatus::Error)
            .count()
    }
}
