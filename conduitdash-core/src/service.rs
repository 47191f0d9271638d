//! Top-level monitoring context
//!
//! [`Monitor`] owns the connection registry, the poll cache, the enforcer
//! and the geo pipeline for one set of hosts. It is created once at startup
//! and torn down with [`Monitor::shutdown`], which closes every live session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AppSettings, GeoSettings, LoadedConfig};
use crate::connection::{CommandExecutor, ConnectionRegistry};
use crate::error::{MonitorError, MonitorResult};
use crate::models::{
    BandwidthUsage, ControlAction, FleetStats, GeoCount, Host, OffsetRecord, StatsRow,
};
use crate::monitoring::{
    EnforcementOutcome, EnforcementResult, GeoCapture, GeoPipeline, LimitEnforcer, PollScheduler,
    Reconciler, StatusParser,
};
use crate::storage::{StatsStore, open_store};
use crate::transport::{OpenSshTransport, Transport};

/// Default window of history and geo queries
pub const DEFAULT_QUERY_HOURS: u32 = 24;

/// Result of a control action on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResult {
    /// Host name
    pub host: String,
    /// Requested action
    pub action: ControlAction,
    /// Whether the command ran
    pub success: bool,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rows removed by an administrative reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearedCounts {
    /// Deleted stats rows
    pub stats: u64,
    /// Deleted offset records
    pub offsets: u64,
}

/// Monitoring context shared by the daemon loops and one-shot commands
pub struct Monitor {
    hosts: Vec<Host>,
    store: Arc<dyn StatsStore>,
    executor: CommandExecutor,
    scheduler: PollScheduler,
    enforcer: LimitEnforcer,
    geo: GeoPipeline,
    unit: String,
    poll_interval: Duration,
    geo_settings: GeoSettings,
}

impl Monitor {
    /// Opens the configured store and connects hosts through the system `ssh`
    pub async fn open(config: &LoadedConfig) -> MonitorResult<Self> {
        let path = config.settings.storage.resolve(&config.config_dir);
        debug!(path = %path.display(), "Opening stats store");
        let store = open_store(&path).await?;
        Ok(Self::with_parts(
            config.hosts.clone(),
            &config.settings,
            Arc::new(OpenSshTransport::new()),
            store,
        ))
    }

    /// Builds a context over an explicit transport and store
    #[must_use]
    pub fn with_parts(
        hosts: Vec<Host>,
        settings: &AppSettings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StatsStore>,
    ) -> Self {
        let registry = ConnectionRegistry::new(transport, settings.ssh.connect_options());
        let executor = CommandExecutor::new(registry).with_timeout(settings.ssh.exec_timeout());
        let reconciler = Reconciler::new(Arc::clone(&store), settings.reset.effective_policy());

        let scheduler = PollScheduler::new(
            hosts.clone(),
            executor.clone(),
            reconciler,
            Arc::clone(&store),
        )
        .with_batching(
            settings.poller.effective_batch_size(),
            settings.poller.batch_delay(),
        )
        .with_cache_ttl(settings.poller.cache_ttl())
        .with_parser(StatusParser::new(settings.parser.rules()))
        .with_status_command(settings.service.status_command());

        let enforcer = LimitEnforcer::new(
            executor.clone(),
            Arc::clone(&store),
            settings.service.unit.clone(),
        );
        let geo = GeoPipeline::new(executor.clone(), Arc::clone(&store))
            .with_command(settings.geo.effective_command());

        Self {
            hosts,
            store,
            executor,
            scheduler,
            enforcer,
            geo,
            unit: settings.service.unit.clone(),
            poll_interval: settings.poller.effective_interval(),
            geo_settings: settings.geo.clone(),
        }
    }

    /// Monitored hosts in configuration order
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StatsStore> {
        &self.store
    }

    /// Current fleet view, served from cache when fresh
    pub async fn fetch_all(&self) -> Arc<FleetStats> {
        self.scheduler.fetch_all().await
    }

    /// Drops the cached fleet view
    pub fn invalidate_cache(&self) {
        self.scheduler.invalidate_cache();
    }

    /// Polls every host, persists the counters, then checks quotas
    ///
    /// Always polls; the fresh result replaces the cached one.
    pub async fn reconcile_and_enforce(&self) -> (Arc<FleetStats>, Vec<EnforcementResult>) {
        self.scheduler.invalidate_cache();
        let stats = self.scheduler.fetch_all().await;
        let results = self.enforcer.enforce(&self.hosts).await;
        if results
            .iter()
            .any(|r| matches!(r.outcome, EnforcementOutcome::Stopped { .. }))
        {
            self.scheduler.invalidate_cache();
        }
        (stats, results)
    }

    /// Checks quotas without polling
    pub async fn enforce(&self) -> Vec<EnforcementResult> {
        self.enforcer.enforce(&self.hosts).await
    }

    /// Runs a geo capture on every host and stores it
    pub async fn capture_geo(&self) -> GeoCapture {
        self.geo.capture(&self.hosts).await
    }

    /// Country totals of the last `hours` hours
    pub async fn fetch_geo(&self, hours: u32) -> MonitorResult<Vec<GeoCount>> {
        Ok(self.geo.query(hours_ago(hours)).await?)
    }

    /// Runs a systemd action on one host and returns its output
    pub async fn control_host(&self, name: &str, action: ControlAction) -> MonitorResult<String> {
        let host = self
            .hosts
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| MonitorError::UnknownHost(name.to_string()))?;
        let result = self.executor.exec(host, &action.command(&self.unit)).await;
        self.scheduler.invalidate_cache();
        let output = result?;
        info!(host = %host.name, action = %action, "Service control command sent");
        Ok(output)
    }

    /// Runs a systemd action on every host at once
    pub async fn control_all(&self, action: ControlAction) -> Vec<ControlResult> {
        let command = action.command(&self.unit);
        let outputs = join_all(self.hosts.iter().map(|h| self.executor.exec(h, &command))).await;
        self.scheduler.invalidate_cache();

        self.hosts
            .iter()
            .zip(outputs)
            .map(|(host, output)| {
                let error = output.err().map(|e| {
                    warn!(
                        host = %host.name,
                        action = %action,
                        error = %e,
                        "Service control failed"
                    );
                    e.to_string()
                });
                ControlResult {
                    host: host.name.clone(),
                    action,
                    success: error.is_none(),
                    error,
                }
            })
            .collect()
    }

    /// Stats rows of the last `hours` hours, oldest first
    pub async fn history(&self, host: Option<&str>, hours: u32) -> MonitorResult<Vec<StatsRow>> {
        if let Some(name) = host
            && !self.hosts.iter().any(|h| h.name == name)
        {
            return Err(MonitorError::UnknownHost(name.to_string()));
        }
        Ok(self.store.query_stats_since(host, hours_ago(hours)).await?)
    }

    /// Month-to-date usage of every host
    pub async fn bandwidth(&self) -> MonitorResult<Vec<BandwidthUsage>> {
        Ok(self.enforcer.usage(&self.hosts).await?)
    }

    /// Stored offset records, ordered by host name
    pub async fn offsets(&self) -> MonitorResult<Vec<(String, OffsetRecord)>> {
        Ok(self.store.list_offsets().await?)
    }

    /// Deletes every offset record
    pub async fn reset_offsets(&self) -> MonitorResult<u64> {
        let removed = self.store.delete_all_offsets().await?;
        self.scheduler.invalidate_cache();
        info!(removed, "Offsets reset");
        Ok(removed)
    }

    /// Deletes all stats history and offsets
    pub async fn clear_stats(&self) -> MonitorResult<ClearedCounts> {
        let stats = self.store.delete_all_stats().await?;
        let offsets = self.store.delete_all_offsets().await?;
        self.scheduler.invalidate_cache();
        info!(stats, offsets, "Stats history cleared");
        Ok(ClearedCounts { stats, offsets })
    }

    /// Runs the stats and geo loops until `shutdown` resolves, then closes
    /// every session
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            hosts = self.hosts.len(),
            interval_secs = self.poll_interval.as_secs(),
            geo = self.geo_settings.enabled,
            "Monitor started"
        );
        tokio::select! {
            () = self.stats_loop() => {}
            () = self.geo_loop(), if self.geo_settings.enabled => {}
            () = shutdown => info!("Shutdown requested"),
        }
        self.shutdown().await;
    }

    async fn stats_loop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (stats, results) = self.reconcile_and_enforce().await;
            debug!(
                hosts = stats.hosts.len(),
                errors = stats.error_count(),
                checked = results.len(),
                "Stats cycle done"
            );
        }
    }

    async fn geo_loop(&self) {
        tokio::time::sleep(self.geo_settings.initial_delay()).await;
        let mut ticker = tokio::time::interval(self.geo_settings.effective_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.capture_geo().await;
        }
    }

    /// Closes every live session
    pub async fn shutdown(&self) {
        let open = self.executor.registry().session_count();
        self.executor.registry().close_all().await;
        info!(sessions = open, "Monitor stopped");
    }
}

fn hours_ago(hours: u32) -> DateTime<Utc> {
    Utc::now() - TimeDelta::hours(i64::from(hours))
}
