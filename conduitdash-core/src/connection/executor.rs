//! Runs commands on hosts through the registry.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::registry::ConnectionRegistry;
use crate::error::{ExecError, ExecResult};
use crate::models::Host;

/// Default upper bound on a single remote command, in seconds
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;

/// Command executor
///
/// Any failure after a session was acquired evicts that session, so the next
/// command for the host starts from a fresh connection.
#[derive(Clone)]
pub struct CommandExecutor {
    registry: ConnectionRegistry,
    exec_timeout: Duration,
}

impl CommandExecutor {
    /// Creates an executor with the default command timeout
    #[must_use]
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            exec_timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
        }
    }

    /// Sets the command timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Returns the registry this executor draws sessions from
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Runs `command` on `host` and returns its combined stdout and stderr
    #[instrument(name = "command.exec", skip(self, host, command), fields(host = %host.name))]
    pub async fn exec(&self, host: &Host, command: &str) -> ExecResult<String> {
        let session = self
            .registry
            .acquire(host)
            .await
            .map_err(|source| ExecError::Connect {
                host: host.name.clone(),
                source,
            })?;

        match tokio::time::timeout(self.exec_timeout, session.execute(command)).await {
            Ok(Ok(output)) => {
                debug!(host = %host.name, bytes = output.len(), "Command completed");
                Ok(output)
            }
            Ok(Err(message)) => {
                warn!(host = %host.name, error = %message, "Command channel failed");
                self.registry.evict_session(&host.name, &session).await;
                Err(ExecError::Channel {
                    host: host.name.clone(),
                    message,
                })
            }
            Err(_) => {
                let secs = self.exec_timeout.as_secs();
                warn!(host = %host.name, secs, "Command timed out");
                self.registry.evict_session(&host.name, &session).await;
                Err(ExecError::Timeout {
                    host: host.name.clone(),
                    secs,
                })
            }
        }
    }

    /// Runs `command` on every host concurrently, results in host order
    pub async fn exec_all(&self, hosts: &[Host], command: &str) -> Vec<ExecResult<String>> {
        futures::future::join_all(hosts.iter().map(|host| self.exec(host, command))).await
    }
}
