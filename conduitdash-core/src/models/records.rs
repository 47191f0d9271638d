//! Persisted records: offsets, stats history and geo samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::ServiceStatus;

/// Per-host offset state, one row per host
///
/// The offsets are the bytes accumulated in earlier service sessions; the
/// `last_*` fields are the session-scoped values seen at the most recent poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRecord {
    /// Upload carried over from earlier sessions
    pub upload_offset: u64,
    /// Download carried over from earlier sessions
    pub download_offset: u64,
    /// Session-scoped upload at the last poll
    pub last_upload: u64,
    /// Session-scoped download at the last poll
    pub last_download: u64,
}

impl OffsetRecord {
    /// Cumulative upload as of the last poll
    #[must_use]
    pub const fn cumulative_upload(&self) -> u64 {
        self.upload_offset.saturating_add(self.last_upload)
    }

    /// Cumulative download as of the last poll
    #[must_use]
    pub const fn cumulative_download(&self) -> u64 {
        self.download_offset.saturating_add(self.last_download)
    }
}

/// One appended row of the stats history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRow {
    /// When the poll happened
    pub timestamp: DateTime<Utc>,
    /// Host name
    pub host: String,
    /// Classified service state
    pub status: ServiceStatus,
    /// Connected clients
    pub clients: u32,
    /// Cumulative upload in bytes
    pub upload_bytes: u64,
    /// Cumulative download in bytes
    pub download_bytes: u64,
    /// Uptime text
    pub uptime: String,
}

/// One appended geo sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRow {
    /// When the capture happened
    pub timestamp: DateTime<Utc>,
    /// Host name, or [`GEO_AGGREGATE_HOST`] for the fleet-wide aggregate
    pub host: String,
    /// ISO 3166 alpha-2 code
    pub country_code: String,
    /// Normalized country name
    pub country_name: String,
    /// Distinct peer addresses seen
    pub count: u64,
}

/// Host name used for the cross-host aggregate geo rows
pub const GEO_AGGREGATE_HOST: &str = "_all";

/// A country tally, either from one capture or summed over a period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCount {
    /// ISO 3166 alpha-2 code
    pub code: String,
    /// Normalized country name
    pub country: String,
    /// Number of distinct peer addresses
    pub count: u64,
}

/// Month-to-date usage of one host against its quota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthUsage {
    /// Host name
    pub name: String,
    /// Highest cumulative upload seen this month
    pub upload_bytes: u64,
    /// Highest cumulative download seen this month
    pub download_bytes: u64,
    /// Metered total (upload only)
    pub total_bytes: u64,
    /// Monthly quota, if any
    pub quota_bytes: Option<u64>,
    /// Percentage of the quota used, two decimals; 0 without a quota
    pub percent: f64,
}

impl BandwidthUsage {
    /// Builds a usage entry, deriving the total and percentage
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        upload: u64,
        download: u64,
        quota: Option<u64>,
    ) -> Self {
        let percent = match quota {
            Some(limit) if limit > 0 => ((upload as f64 / limit as f64) * 10_000.0).round() / 100.0,
            _ => 0.0,
        };
        Self {
            name: name.into(),
            upload_bytes: upload,
            download_bytes: download,
            total_bytes: upload,
            quota_bytes: quota,
            percent,
        }
    }

    /// Returns true if the metered total has reached the quota
    #[must_use]
    pub fn over_quota(&self) -> bool {
        self.quota_bytes
            .is_some_and(|limit| self.total_bytes >= limit)
    }
}

/// Service control action sent to a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start the service
    Start,
    /// Stop the service
    Stop,
    /// Restart the service
    Restart,
}

impl ControlAction {
    /// Returns the systemctl verb for this action
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    /// Builds the remote command for a systemd unit
    #[must_use]
    pub fn command(&self, unit: &str) -> String {
        format!("systemctl {} {unit}", self.as_str())
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(format!("invalid action: {other}")),
        }
    }
}
