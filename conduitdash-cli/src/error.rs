//! CLI error types and exit codes.

use conduitdash_core::error::{ConfigError, MonitorError, StoreError};

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, storage, or other non-remote errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Remote failure - a host could not be reached or a command failed
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stats store error
    #[error("Storage error: {0}")]
    Store(String),

    /// Remote command failed on a targeted host
    #[error("Remote command failed: {0}")]
    Remote(String),

    /// Host not configured
    #[error("Server not found: {0}")]
    UnknownHost(String),

    /// Async runtime or signal setup failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Output serialization failed
    #[error("Output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<MonitorError> for CliError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Config(e) => e.into(),
            MonitorError::Store(e) => e.into(),
            MonitorError::Exec(e) => Self::Remote(e.to_string()),
            MonitorError::UnknownHost(name) => Self::UnknownHost(name),
        }
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, storage, runtime, IO)
    /// - 2: Remote failure (command failed, host not found)
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Remote(_) | Self::UnknownHost(_) => exit_codes::CONNECTION_FAILURE,
            Self::Config(_) | Self::Store(_) | Self::Runtime(_) | Self::Output(_) | Self::Io(_) => {
                exit_codes::GENERAL_ERROR
            }
        }
    }
}
