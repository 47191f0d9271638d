//! Scripted transport for exercising the poller without real hosts
//!
//! [`ScriptedTransport`] answers every command through a responder closure
//! and records what was run, when, and how often each host was connected.
//! Connect failures and dropped sessions can be toggled per host at runtime.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ConnectError, ConnectResult};
use crate::models::Host;
use crate::transport::{ConnectOptions, RemoteSession, Transport};

/// What a scripted session answers to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Combined command output
    Output(String),
    /// The command channel breaks with this description
    ChannelError(String),
    /// The command never completes
    Hang,
}

impl ScriptedReply {
    /// Successful output
    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output(text.into())
    }

    /// Channel failure
    #[must_use]
    pub fn channel_error(message: impl Into<String>) -> Self {
        Self::ChannelError(message.into())
    }
}

/// A command seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Host name
    pub host: String,
    /// Command text
    pub command: String,
    /// When the command started
    pub at: Instant,
}

type Responder = dyn Fn(&str, &str) -> ScriptedReply + Send + Sync;

struct ScriptState {
    responder: Box<Responder>,
    connect_delay: Duration,
    exec_delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    connects: Mutex<HashMap<String, usize>>,
    attempts: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    sessions: Mutex<Vec<(String, watch::Sender<bool>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process transport driven by a responder closure
#[derive(Clone)]
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

impl ScriptedTransport {
    /// Creates a transport answering `(host name, command)` with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> ScriptedReply + Send + Sync + 'static,
    {
        Self::build(Box::new(responder), Duration::ZERO, Duration::ZERO)
    }

    fn build(responder: Box<Responder>, connect_delay: Duration, exec_delay: Duration) -> Self {
        Self {
            state: Arc::new(ScriptState {
                responder,
                connect_delay,
                exec_delay,
                calls: Mutex::new(Vec::new()),
                connects: Mutex::new(HashMap::new()),
                attempts: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashSet::new()),
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a transport whose connects and commands take the given time
    pub fn with_delays<F>(responder: F, connect_delay: Duration, exec_delay: Duration) -> Self
    where
        F: Fn(&str, &str) -> ScriptedReply + Send + Sync + 'static,
    {
        Self::build(Box::new(responder), connect_delay, exec_delay)
    }

    /// Makes connects to `host` fail until restored
    pub fn fail_connect(&self, host: &str) {
        lock(&self.state.failing).insert(host.to_string());
    }

    /// Lets connects to `host` succeed again
    pub fn restore_connect(&self, host: &str) {
        lock(&self.state.failing).remove(host);
    }

    /// Simulates the remote end closing every session of `host`
    pub fn drop_sessions(&self, host: &str) {
        for (name, alive) in lock(&self.state.sessions).iter() {
            if name == host {
                alive.send_replace(false);
            }
        }
    }

    /// Number of successful connects to `host`
    #[must_use]
    pub fn connect_count(&self, host: &str) -> usize {
        lock(&self.state.connects).get(host).copied().unwrap_or(0)
    }

    /// Number of connects to `host`, refused ones included
    #[must_use]
    pub fn connect_attempts(&self, host: &str) -> usize {
        lock(&self.state.attempts).get(host).copied().unwrap_or(0)
    }

    /// Number of successful connects across all hosts
    #[must_use]
    pub fn total_connects(&self) -> usize {
        lock(&self.state.connects).values().sum()
    }

    /// Every command seen so far, in start order
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.state.calls).clone()
    }

    /// Commands seen so far whose text contains `needle`
    #[must_use]
    pub fn calls_matching(&self, needle: &str) -> Vec<RecordedCall> {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.command.contains(needle))
            .cloned()
            .collect()
    }

    /// Forgets recorded commands
    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(
        &self,
        host: &Host,
        _options: &ConnectOptions,
    ) -> ConnectResult<Arc<dyn RemoteSession>> {
        *lock(&self.state.attempts)
            .entry(host.name.clone())
            .or_insert(0) += 1;
        if !self.state.connect_delay.is_zero() {
            tokio::time::sleep(self.state.connect_delay).await;
        }
        if lock(&self.state.failing).contains(&host.name) {
            return Err(ConnectError::Handshake(format!(
                "{}: connection refused",
                host.address
            )));
        }

        *lock(&self.state.connects)
            .entry(host.name.clone())
            .or_insert(0) += 1;

        let (alive, _) = watch::channel(true);
        lock(&self.state.sessions).push((host.name.clone(), alive.clone()));
        Ok(Arc::new(ScriptedSession {
            host: host.name.clone(),
            alive,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedSession {
    host: String,
    alive: watch::Sender<bool>,
    state: Arc<ScriptState>,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    async fn execute(&self, command: &str) -> Result<String, String> {
        lock(&self.state.calls).push(RecordedCall {
            host: self.host.clone(),
            command: command.to_string(),
            at: Instant::now(),
        });
        if !self.state.exec_delay.is_zero() {
            tokio::time::sleep(self.state.exec_delay).await;
        }
        match (self.state.responder)(&self.host, command) {
            ScriptedReply::Output(text) => Ok(text),
            ScriptedReply::ChannelError(message) => Err(message),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }

    async fn closed(&self) {
        let mut alive = self.alive.subscribe();
        let _ = alive.wait_for(|alive| !*alive).await;
    }

    async fn close(&self) {
        self.alive.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_connects() {
        let transport = ScriptedTransport::new(|host, _| ScriptedReply::output(host.to_string()));
        let host = Host::new("a", "10.0.0.1", "root");
        let session = transport
            .connect(&host, &ConnectOptions::new("/dev/null"))
            .await
            .unwrap();

        assert_eq!(session.execute("uptime").await.unwrap(), "a");
        assert_eq!(transport.connect_count("a"), 1);
        assert_eq!(transport.calls_matching("uptime").len(), 1);
    }

    #[tokio::test]
    async fn test_drop_sessions_resolves_closed() {
        let transport = ScriptedTransport::new(|_, _| ScriptedReply::output(""));
        let host = Host::new("a", "10.0.0.1", "root");
        let session = transport
            .connect(&host, &ConnectOptions::new("/dev/null"))
            .await
            .unwrap();

        transport.drop_sessions("a");
        session.closed().await;
        assert!(!session.is_alive());
    }
}
