//! Remote shell transport
//!
//! A [`Transport`] opens authenticated sessions; a [`RemoteSession`] runs
//! commands and reports when it dies. The registry is the only owner of
//! sessions. The production transport drives the system `ssh` client through
//! a control master per host; tests use [`crate::testing::ScriptedTransport`].

mod openssh;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use openssh::OpenSshTransport;

use crate::error::ConnectResult;
use crate::models::Host;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default keepalive probe interval in seconds
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// Default number of unanswered keepalives before the session is dropped
pub const DEFAULT_KEEPALIVE_COUNT_MAX: u32 = 3;

/// Parameters for establishing a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Private key used for authentication
    pub key_path: PathBuf,
    /// Upper bound on session setup
    pub connect_timeout: Duration,
    /// Interval between keepalive probes
    pub keepalive_interval: Duration,
    /// Unanswered probes before the session is considered dead
    pub keepalive_count_max: u32,
}

impl ConnectOptions {
    /// Creates options with default timeouts for the given key
    #[must_use]
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_INTERVAL_SECS),
            keepalive_count_max: DEFAULT_KEEPALIVE_COUNT_MAX,
        }
    }

    /// Sets the connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive probing parameters
    #[must_use]
    pub const fn with_keepalive(mut self, interval: Duration, count_max: u32) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_count_max = count_max;
        self
    }
}

/// An established session to one host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Returns true until the session has errored, ended or been closed
    fn is_alive(&self) -> bool;

    /// Runs a command and returns stdout and stderr concatenated
    ///
    /// Resolves when the remote command's output streams close. The remote
    /// exit status is not an error; a broken channel is, and is reported as
    /// a description.
    async fn execute(&self, command: &str) -> Result<String, String>;

    /// Resolves once the session is no longer alive
    async fn closed(&self);

    /// Closes the session
    async fn close(&self);
}

/// Factory for sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes an authenticated session to `host`
    ///
    /// Implementations need not enforce `options.connect_timeout`
    /// themselves; the registry bounds the whole call.
    async fn connect(
        &self,
        host: &Host,
        options: &ConnectOptions,
    ) -> ConnectResult<Arc<dyn RemoteSession>>;
}
