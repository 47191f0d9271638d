//! One long-lived session per host
//!
//! Sessions are created lazily on first use and evicted as soon as they
//! die. A per-host guard serializes connection setup so concurrent callers
//! for the same host share one session instead of racing to open several.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, instrument, warn};

use crate::error::{ConnectError, ConnectResult};
use crate::models::Host;
use crate::transport::{ConnectOptions, RemoteSession, Transport};

struct RegistryInner {
    transport: Arc<dyn Transport>,
    options: ConnectOptions,
    sessions: Mutex<HashMap<String, Arc<dyn RemoteSession>>>,
    connect_guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegistryInner {
    fn live(&self, name: &str) -> Option<Arc<dyn RemoteSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(name) {
            Some(session) if session.is_alive() => Some(Arc::clone(session)),
            Some(_) => {
                sessions.remove(name);
                debug!(host = %name, "Dropped dead session");
                None
            }
            None => None,
        }
    }

    /// Removes the entry for `name` only if it is still `session`
    fn remove_if_same(&self, name: &str, session: &Arc<dyn RemoteSession>) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(name);
            return true;
        }
        false
    }

    fn connect_guard(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self
            .connect_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(guards.entry(name.to_string()).or_default())
    }
}

/// Registry of live sessions, cheap to clone
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, options: ConnectOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                options,
                sessions: Mutex::new(HashMap::new()),
                connect_guards: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the connect options used for new sessions
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.inner.options
    }

    /// Returns the live session for `host`, establishing one if needed
    ///
    /// Connection setup is bounded by the configured connect timeout. A
    /// caller that finds another setup in flight for the same host waits for
    /// it and reuses its session.
    #[instrument(name = "connection.establish", skip(self, host), fields(host = %host.name))]
    pub async fn acquire(&self, host: &Host) -> ConnectResult<Arc<dyn RemoteSession>> {
        if let Some(session) = self.inner.live(&host.name) {
            return Ok(session);
        }

        let guard = self.inner.connect_guard(&host.name);
        let _setup = guard.lock().await;

        if let Some(session) = self.inner.live(&host.name) {
            return Ok(session);
        }

        let timeout = self.inner.options.connect_timeout;
        let session = match tokio::time::timeout(
            timeout,
            self.inner.transport.connect(host, &self.inner.options),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(host = %host.name, error = %e, "SSH connect failed");
                return Err(e);
            }
            Err(_) => {
                warn!(host = %host.name, secs = timeout.as_secs(), "SSH connect timed out");
                return Err(ConnectError::Timeout(timeout.as_secs()));
            }
        };

        debug!(host = %host.name, "Session established");
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.name.clone(), Arc::clone(&session));
        self.watch(host.name.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Evicts the session as soon as it dies
    fn watch(&self, name: String, session: Arc<dyn RemoteSession>) {
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            session.closed().await;
            if let Some(inner) = registry.upgrade()
                && inner.remove_if_same(&name, &session)
            {
                debug!(host = %name, "Session closed, evicted");
            }
        });
    }

    /// Evicts and closes whatever session `name` has
    pub async fn evict(&self, name: &str) {
        let removed = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(session) = removed {
            debug!(host = %name, "Session evicted");
            session.close().await;
        }
    }

    /// Evicts and closes `session` if it is still the one registered for `name`
    ///
    /// A newer session established in the meantime is left alone.
    pub async fn evict_session(&self, name: &str, session: &Arc<dyn RemoteSession>) {
        if self.inner.remove_if_same(name, session) {
            debug!(host = %name, "Session evicted");
        }
        session.close().await;
    }

    /// Returns true if `name` has a live session
    #[must_use]
    pub fn is_connected(&self, name: &str) -> bool {
        self.inner.live(name).is_some()
    }

    /// Returns the number of registered sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Closes every session
    pub async fn close_all(&self) {
        let sessions: Vec<(String, Arc<dyn RemoteSession>)> = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        let count = sessions.len();
        for (_, session) in sessions {
            session.close().await;
        }
        debug!(count, "Closed all sessions");
    }
}
