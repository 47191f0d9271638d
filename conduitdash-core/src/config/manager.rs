//! Configuration directory and host list loading

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::settings::{AppSettings, DEFAULT_QUOTA_TIB, HostEntry};
use crate::error::{ConfigError, ConfigResult};
use crate::models::{GEO_AGGREGATE_HOST, Host};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "CONDUITDASH_CONFIG_DIR";

/// Environment variables holding a compact host list, checked in order
pub const SERVERS_ENV: [&str; 2] = ["CONDUITDASH_SERVERS", "SERVERS"];

/// Environment variable overriding `[ssh] key_path`
pub const SSH_KEY_ENV: &str = "SSH_KEY_PATH";

/// Settings file name
pub const SETTINGS_FILE: &str = "config.toml";

/// Host list file name
pub const SERVERS_FILE: &str = "servers.json";

/// Settings and hosts loaded at startup
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed `config.toml`
    pub settings: AppSettings,
    /// Hosts from the first non-empty source
    pub hosts: Vec<Host>,
    /// Directory the configuration was loaded from
    pub config_dir: PathBuf,
}

/// Locates and reads configuration files
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Uses `CONDUITDASH_CONFIG_DIR`, else the platform config directory
    pub fn new() -> ConfigResult<Self> {
        Self::resolve(None)
    }

    /// Uses `explicit` if given, else falls back as [`ConfigManager::new`]
    pub fn resolve(explicit: Option<PathBuf>) -> ConfigResult<Self> {
        let config_dir = match explicit {
            Some(dir) => dir,
            None => match std::env::var_os(CONFIG_DIR_ENV) {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => dirs::config_dir()
                    .ok_or(ConfigError::NoConfigDir)?
                    .join("conduitdash"),
            },
        };
        Ok(Self { config_dir })
    }

    /// Uses `dir` as the configuration directory
    #[must_use]
    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
        }
    }

    /// Returns the configuration directory
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of `config.toml`
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Path of `servers.json`
    #[must_use]
    pub fn servers_path(&self) -> PathBuf {
        self.config_dir.join(SERVERS_FILE)
    }

    /// Reads `config.toml`, defaults if absent, then applies `SSH_KEY_PATH`
    pub fn load_settings(&self) -> ConfigResult<AppSettings> {
        let mut settings = self.read_settings_file()?;
        if let Ok(key) = std::env::var(SSH_KEY_ENV)
            && !key.trim().is_empty()
        {
            debug!(key = %key, "Using SSH key from environment");
            settings.ssh.key_path = key;
        }
        Ok(settings)
    }

    fn read_settings_file(&self) -> ConfigResult<AppSettings> {
        let path = self.settings_path();
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(AppSettings::default());
        }
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path,
            reason: e.to_string(),
        })
    }

    /// Loads hosts using the `SERVERS` variables from the environment
    pub fn load_hosts(&self, settings: &AppSettings) -> ConfigResult<Vec<Host>> {
        let env_value = SERVERS_ENV
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
        self.load_hosts_with(settings, env_value.as_deref())
    }

    /// Loads hosts from the first non-empty source
    ///
    /// Sources in order: `[[hosts]]` in `config.toml`, `servers.json`, then
    /// `servers_env`. Fails if all are empty or a name is used twice.
    pub fn load_hosts_with(
        &self,
        settings: &AppSettings,
        servers_env: Option<&str>,
    ) -> ConfigResult<Vec<Host>> {
        let default_port = settings.ssh.port;

        let (source, hosts) = if settings.hosts.is_empty() {
            let from_file = self.read_servers_file(default_port)?;
            if from_file.is_empty() {
                match servers_env {
                    Some(value) => ("environment", parse_servers_env(value, default_port)?),
                    None => ("environment", Vec::new()),
                }
            } else {
                ("servers.json", from_file)
            }
        } else {
            let hosts = settings
                .hosts
                .iter()
                .map(|entry| entry.to_host(default_port))
                .collect::<ConfigResult<Vec<_>>>()?;
            ("config.toml", hosts)
        };

        if hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        check_unique(&hosts)?;
        info!(count = hosts.len(), source, "Loaded hosts");
        Ok(hosts)
    }

    fn read_servers_file(&self, default_port: u16) -> ConfigResult<Vec<Host>> {
        let path = self.servers_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        let entries: Vec<HostEntry> =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path,
                reason: e.to_string(),
            })?;
        entries
            .iter()
            .map(|entry| entry.to_host(default_port))
            .collect()
    }

    /// Loads settings and hosts together
    pub fn load(&self) -> ConfigResult<LoadedConfig> {
        let settings = self.load_settings()?;
        let hosts = self.load_hosts(&settings)?;
        Ok(LoadedConfig {
            settings,
            hosts,
            config_dir: self.config_dir.clone(),
        })
    }
}

/// Parses `name:host:user:limitTB` entries separated by commas
///
/// A missing or unparseable limit means 10 TB; an explicit `0` disables
/// enforcement for that host.
pub fn parse_servers_env(value: &str, default_port: u16) -> ConfigResult<Vec<Host>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
                return Err(ConfigError::InvalidHost {
                    entry: entry.to_string(),
                    reason: "expected name:host:user[:limitTB]".to_string(),
                });
            }
            let limit_tb = parts
                .get(3)
                .and_then(|l| l.parse::<f64>().ok())
                .filter(|l| l.is_finite() && *l >= 0.0)
                .unwrap_or(DEFAULT_QUOTA_TIB);

            let mut host = Host::new(parts[0], parts[1], parts[2]).with_port(default_port);
            if limit_tb > 0.0 {
                host.quota_bytes = Some(Host::quota_from_tib(limit_tb));
            }
            Ok(host)
        })
        .collect()
}

/// Rejects duplicate names and the name reserved for geo aggregate rows
fn check_unique(hosts: &[Host]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for host in hosts {
        if host.name == GEO_AGGREGATE_HOST {
            return Err(ConfigError::InvalidHost {
                entry: host.name.clone(),
                reason: format!("'{GEO_AGGREGATE_HOST}' is reserved"),
            });
        }
        if !seen.insert(host.name.as_str()) {
            return Err(ConfigError::DuplicateHost(host.name.clone()));
        }
    }
    Ok(())
}
