//! Error types for `conduitdash`
//!
//! Each component has its own error enum. Per-host failures (`ConnectError`,
//! `ExecError`) are caught at the host boundary by the poller, the geo
//! pipeline and the enforcer; they never abort sibling hosts. Status parsing
//! has no error type because the parser always degrades to a default snapshot.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to establish a remote-shell session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The private key could not be read
    #[error("Cannot read SSH key {path}: {reason}")]
    Credential {
        /// Path of the key file
        path: PathBuf,
        /// Underlying I/O error
        reason: String,
    },

    /// The transport process could not be started
    #[error("Failed to spawn SSH process: {0}")]
    Spawn(String),

    /// Network or authentication failure reported by the transport
    #[error("SSH connect failed: {0}")]
    Handshake(String),

    /// The session was not ready within the connect timeout
    #[error("SSH connect timed out after {0}s")]
    Timeout(u64),
}

/// Failure to run a command on a host
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// No session could be acquired for the host
    #[error("{host}: {source}")]
    Connect {
        /// Host name
        host: String,
        /// Why the session could not be established
        #[source]
        source: ConnectError,
    },

    /// The command channel failed after the session was established
    #[error("{host}: command channel failed: {message}")]
    Channel {
        /// Host name
        host: String,
        /// Transport-level failure description
        message: String,
    },

    /// The command did not complete within the exec timeout
    #[error("{host}: command timed out after {secs}s")]
    Timeout {
        /// Host name
        host: String,
        /// Timeout that elapsed
        secs: u64,
    },
}

impl ExecError {
    /// Returns the name of the host the failure belongs to
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Connect { host, .. } | Self::Channel { host, .. } | Self::Timeout { host, .. } => {
                host
            }
        }
    }
}

/// Persistence adapter failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or migrated
    #[error("Failed to initialize stats store: {0}")]
    Init(String),

    /// A schema migration failed
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A query or write failed
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No hosts were found in any configuration source
    #[error(
        "No servers configured. Add [[hosts]] to config.toml, create servers.json or set SERVERS"
    )]
    NoHosts,

    /// Two hosts share the same name
    #[error("Duplicate host name: {0}")]
    DuplicateHost(String),

    /// A host entry is missing a required field or has an invalid value
    #[error("Invalid host entry '{entry}': {reason}")]
    InvalidHost {
        /// The offending entry as written
        entry: String,
        /// What is wrong with it
        reason: String,
    },

    /// The configuration directory could not be determined
    #[error("Cannot determine configuration directory")]
    NoConfigDir,

    /// Failed to parse a configuration file
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the monitor service to its callers
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Store-level failure (the only aggregate failure a caller sees)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Remote command failure for a single targeted host
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The requested host is not configured
    #[error("Server not found: {0}")]
    UnknownHost(String),
}

/// Result type for registry operations
pub type ConnectResult<T> = std::result::Result<T, ConnectError>;

/// Result type for executor operations
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for service operations
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
