//! Application settings stored in `config.toml`
//!
//! Every section and every field is optional; a missing file gives the
//! defaults. Out-of-range values are tolerated on load and clamped by the
//! `effective_*` accessors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::models::{DEFAULT_SSH_PORT, Host};
use crate::monitoring::{
    DEFAULT_DROP_RATIO, DEFAULT_MIN_RESET_BYTES, GEO_COMMAND, ResetPolicy, StatusRule, StatusRules,
};
use crate::storage::IN_MEMORY;
use crate::transport::{
    ConnectOptions, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEEPALIVE_COUNT_MAX,
    DEFAULT_KEEPALIVE_INTERVAL_SECS,
};

/// Default private key location
pub const DEFAULT_KEY_PATH: &str = "~/.ssh/id_ed25519";

/// Default systemd unit of the relay service
pub const DEFAULT_SERVICE_UNIT: &str = "conduit";

/// Default history database file name inside the config directory
pub const DEFAULT_DB_FILE: &str = "stats.db";

/// Quota applied to hosts from the `SERVERS` variable without an explicit limit
pub const DEFAULT_QUOTA_TIB: f64 = 10.0;

/// Root of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Remote shell settings
    #[serde(default)]
    pub ssh: SshSettings,
    /// Bandwidth poll settings
    #[serde(default)]
    pub poller: PollerSettings,
    /// Counter reset detection thresholds
    #[serde(default)]
    pub reset: ResetSettings,
    /// Geo capture settings
    #[serde(default)]
    pub geo: GeoSettings,
    /// Relay service unit
    #[serde(default)]
    pub service: ServiceSettings,
    /// Extra status classification rules
    #[serde(default)]
    pub parser: ParserSettings,
    /// History database location
    #[serde(default)]
    pub storage: StorageSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Monitored hosts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostEntry>,
}

/// `[ssh]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    /// Private key, `~` is expanded
    #[serde(default = "default_key_path")]
    pub key_path: String,
    /// Port used for hosts that do not set one
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection setup timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Keepalive probe interval
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Unanswered keepalives before the session is dropped
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count_max: u32,
    /// Remote command timeout
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
}

fn default_key_path() -> String {
    DEFAULT_KEY_PATH.to_string()
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

const fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_SECS
}

const fn default_keepalive_count() -> u32 {
    DEFAULT_KEEPALIVE_COUNT_MAX
}

const fn default_exec_timeout() -> u64 {
    crate::connection::DEFAULT_EXEC_TIMEOUT_SECS
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_count_max: default_keepalive_count(),
            exec_timeout_secs: default_exec_timeout(),
        }
    }
}

impl SshSettings {
    /// Returns the key path with `~` and variables expanded
    #[must_use]
    pub fn effective_key_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.key_path).into_owned())
    }

    /// Returns the command timeout, at least one second
    #[must_use]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs.max(1))
    }

    /// Builds transport connect options
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.effective_key_path())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs.max(1)))
            .with_keepalive(
                Duration::from_secs(self.keepalive_interval_secs.max(1)),
                self.keepalive_count_max.max(1),
            )
    }
}

/// `[poller]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Seconds between stats polls in the daemon
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Hosts polled concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
    /// Lifetime of the cached fleet result
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

const fn default_poll_interval() -> u64 {
    30
}

const fn default_batch_size() -> usize {
    3
}

const fn default_batch_delay() -> u64 {
    500
}

const fn default_cache_ttl() -> u64 {
    5
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl PollerSettings {
    /// Returns the batch size, at least 1
    #[must_use]
    pub const fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 { 1 } else { self.batch_size }
    }

    /// Returns the poll interval, at least one second
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Returns the pause between batches
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Returns the cache lifetime
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// `[reset]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetSettings {
    /// A drop below `last * drop_ratio` is a reset; must be in (0, 1]
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: f64,
    /// Previous value that must be exceeded for a drop to count
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
}

const fn default_drop_ratio() -> f64 {
    DEFAULT_DROP_RATIO
}

const fn default_min_bytes() -> u64 {
    DEFAULT_MIN_RESET_BYTES
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            drop_ratio: default_drop_ratio(),
            min_bytes: default_min_bytes(),
        }
    }
}

impl ResetSettings {
    /// Returns the reset policy, falling back to the default ratio if out of range
    #[must_use]
    pub fn effective_policy(&self) -> ResetPolicy {
        let drop_ratio = if self.drop_ratio.is_finite() && self.drop_ratio > 0.0 {
            self.drop_ratio.min(1.0)
        } else {
            DEFAULT_DROP_RATIO
        };
        ResetPolicy {
            drop_ratio,
            min_bytes: self.min_bytes,
        }
    }
}

/// `[geo]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoSettings {
    /// Whether the daemon runs geo captures
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between captures
    #[serde(default = "default_geo_interval")]
    pub interval_secs: u64,
    /// Seconds after startup before the first capture
    #[serde(default = "default_geo_initial_delay")]
    pub initial_delay_secs: u64,
    /// Replacement capture command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_geo_interval() -> u64 {
    300
}

const fn default_geo_initial_delay() -> u64 {
    5
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_geo_interval(),
            initial_delay_secs: default_geo_initial_delay(),
            command: None,
        }
    }
}

impl GeoSettings {
    /// Returns the capture interval, at least one second
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Returns the delay before the first capture
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Returns the capture command
    #[must_use]
    pub fn effective_command(&self) -> &str {
        self.command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(GEO_COMMAND)
    }
}

/// `[service]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// systemd unit polled and controlled on every host
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    DEFAULT_SERVICE_UNIT.to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            unit: default_unit(),
        }
    }
}

impl ServiceSettings {
    /// Command printing the unit status and the tail of its journal
    #[must_use]
    pub fn status_command(&self) -> String {
        format!(
            "systemctl status {unit} 2>/dev/null; journalctl -u {unit} -n 20 --no-pager 2>/dev/null",
            unit = self.unit
        )
    }
}

/// `[parser]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserSettings {
    /// Rules appended after the built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_rules: Vec<StatusRule>,
}

impl ParserSettings {
    /// Returns the built-in rules followed by the configured ones
    #[must_use]
    pub fn rules(&self) -> StatusRules {
        StatusRules::default().with_extra(self.extra_rules.iter().cloned())
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file, `:memory:` for a non-persistent store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl StorageSettings {
    /// Resolves the database location against the config directory
    #[must_use]
    pub fn resolve(&self, config_dir: &Path) -> PathBuf {
        match self.path.as_deref() {
            Some(IN_MEMORY) => PathBuf::from(IN_MEMORY),
            Some(path) if !path.trim().is_empty() => {
                let expanded = PathBuf::from(shellexpand::tilde(path).into_owned());
                if expanded.is_absolute() {
                    expanded
                } else {
                    config_dir.join(expanded)
                }
            }
            _ => config_dir.join(DEFAULT_DB_FILE),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level name (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Filter directive, overrides `level`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Log file; stderr when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// One `[[hosts]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Unique display name
    pub name: String,
    /// Address
    #[serde(alias = "address")]
    pub host: String,
    /// Login principal
    pub user: String,
    /// SSH port, `[ssh] port` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Monthly upload quota in bytes
    #[serde(
        default,
        alias = "bandwidthLimit",
        skip_serializing_if = "Option::is_none"
    )]
    pub bandwidth_limit: Option<u64>,
    /// Monthly upload quota in TiB, used when `bandwidth_limit` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_limit_tb: Option<f64>,
}

impl HostEntry {
    /// Validates the entry and converts it to a [`Host`]
    pub fn to_host(&self, default_port: u16) -> ConfigResult<Host> {
        for (field, value) in [("name", &self.name), ("host", &self.host), ("user", &self.user)] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidHost {
                    entry: self.name.clone(),
                    reason: format!("missing {field}"),
                });
            }
        }

        let quota = self
            .bandwidth_limit
            .or_else(|| self.bandwidth_limit_tb.map(Host::quota_from_tib))
            .filter(|bytes| *bytes > 0);

        let mut host = Host::new(self.name.trim(), self.host.trim(), self.user.trim())
            .with_port(self.port.unwrap_or(default_port));
        host.quota_bytes = quota;
        Ok(host)
    }
}
