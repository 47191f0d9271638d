//! Configuration management for `conduitdash`
//!
//! [`ConfigManager`] resolves the configuration directory, reads
//! `config.toml` into [`AppSettings`] and loads the host list.

mod manager;
pub mod settings;

pub use manager::{
    CONFIG_DIR_ENV, ConfigManager, LoadedConfig, SERVERS_ENV, SERVERS_FILE, SETTINGS_FILE,
    SSH_KEY_ENV, parse_servers_env,
};
pub use settings::{
    AppSettings, GeoSettings, HostEntry, LoggingSettings, ParserSettings, PollerSettings,
    ResetSettings, ServiceSettings, SshSettings, StorageSettings,
};
