//! Batched fleet polling with a short-lived result cache
//!
//! Hosts are polled in fixed-size batches: concurrently within a batch,
//! batches strictly one after another with a pause in between. The finished
//! aggregate is cached for a few seconds; concurrent callers that miss the
//! cache at the same moment each run their own poll.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::bytes::format_bytes;
use super::parser::StatusParser;
use super::reconcile::Reconciler;
use crate::connection::CommandExecutor;
use crate::models::{FleetStats, Host, HostStats, OffsetRecord, Snapshot};
use crate::storage::StatsStore;

/// Default number of hosts polled concurrently
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Default pause between batches
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Default lifetime of the cached aggregate
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Default status command
pub const DEFAULT_STATUS_COMMAND: &str =
    "systemctl status conduit 2>/dev/null; journalctl -u conduit -n 20 --no-pager 2>/dev/null";

struct CachedStats {
    stats: Arc<FleetStats>,
    cached_at: Instant,
}

/// Polls every host and keeps the latest aggregate
pub struct PollScheduler {
    hosts: Vec<Host>,
    executor: CommandExecutor,
    parser: StatusParser,
    reconciler: Reconciler,
    store: Arc<dyn StatsStore>,
    status_command: String,
    batch_size: usize,
    batch_delay: Duration,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedStats>>,
}

impl PollScheduler {
    /// Creates a scheduler with default batching, cache and status command
    #[must_use]
    pub fn new(
        hosts: Vec<Host>,
        executor: CommandExecutor,
        reconciler: Reconciler,
        store: Arc<dyn StatsStore>,
    ) -> Self {
        Self {
            hosts,
            executor,
            parser: StatusParser::default(),
            reconciler,
            store,
            status_command: DEFAULT_STATUS_COMMAND.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    /// Sets the batch size (at least 1) and the pause between batches
    #[must_use]
    pub fn with_batching(mut self, size: usize, delay: Duration) -> Self {
        self.batch_size = size.max(1);
        self.batch_delay = delay;
        self
    }

    /// Sets the cache lifetime; zero disables caching
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the status parser
    #[must_use]
    pub fn with_parser(mut self, parser: StatusParser) -> Self {
        self.parser = parser;
        self
    }

    /// Sets the command run on every host
    #[must_use]
    pub fn with_status_command(mut self, command: impl Into<String>) -> Self {
        self.status_command = command.into();
        self
    }

    /// Returns the polled hosts in configuration order
    #[must_use]
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Returns the current aggregate, polling the fleet on a cache miss
    ///
    /// Never fails: unreachable hosts appear with `status = error`, and
    /// persistence failures are logged while the polled values are still
    /// returned.
    pub async fn fetch_all(&self) -> Arc<FleetStats> {
        if let Some(stats) = self.cached() {
            debug!("Fleet stats served from cache");
            return stats;
        }

        let stats = Arc::new(self.poll().await);
        if !self.cache_ttl.is_zero() {
            *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedStats {
                stats: Arc::clone(&stats),
                cached_at: Instant::now(),
            });
        }
        stats
    }

    /// Drops the cached aggregate
    pub fn invalidate_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Fleet stats cache invalidated");
    }

    fn cached(&self) -> Option<Arc<FleetStats>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < self.cache_ttl)
            .map(|entry| Arc::clone(&entry.stats))
    }

    #[instrument(name = "poll.cycle", skip(self), fields(hosts = self.hosts.len()))]
    async fn poll(&self) -> FleetStats {
        let snapshots = self.fetch_snapshots().await;
        let at = Utc::now();

        let mut reconciled = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            match self.reconciler.reconcile(snapshot, at).await {
                Ok(result) => reconciled.push(Some(result.record)),
                Err(e) => {
                    warn!(host = %snapshot.host, error = %e, "Failed to persist stats");
                    reconciled.push(None);
                }
            }
        }

        let mut hosts = Vec::with_capacity(snapshots.len());
        for ((host, snapshot), fallback) in self.hosts.iter().zip(&snapshots).zip(reconciled) {
            let record = match self.store.get_offset(&host.name).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(host = %host.name, error = %e, "Failed to read offsets");
                    fallback
                }
            };
            hosts.push(display_stats(host, snapshot, record.as_ref()));
        }

        let stats = FleetStats {
            computed_at: at,
            hosts,
        };
        info!(
            hosts = stats.hosts.len(),
            errors = stats.error_count(),
            "Poll cycle complete"
        );
        stats
    }

    /// Polls every host in batches and returns snapshots in host order
    pub async fn fetch_snapshots(&self) -> Vec<Snapshot> {
        let mut snapshots = Vec::with_capacity(self.hosts.len());
        for (index, batch) in self.hosts.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            debug!(batch = index, size = batch.len(), "Polling batch");
            snapshots.extend(join_all(batch.iter().map(|host| self.fetch_one(host))).await);
        }
        snapshots
    }

    async fn fetch_one(&self, host: &Host) -> Snapshot {
        match self.executor.exec(host, &self.status_command).await {
            Ok(output) => self.parser.parse(&output, &host.name),
            Err(e) => {
                warn!(host = %host.name, error = %e, "Failed to poll host");
                Snapshot::failed(&host.name, e.to_string())
            }
        }
    }
}

/// Builds display values for one host from its snapshot and offset record
///
/// Hosts that could not be polled show zeroed metrics; the others show the
/// cumulative totals held by the offset record.
#[must_use]
pub fn display_stats(
    host: &Host,
    snapshot: &Snapshot,
    record: Option<&OffsetRecord>,
) -> HostStats {
    let (upload_bytes, download_bytes) = match record {
        _ if snapshot.is_error() => (0, 0),
        Some(record) => (record.cumulative_upload(), record.cumulative_download()),
        None => (
            super::bytes::parse_bytes(&snapshot.upload),
            super::bytes::parse_bytes(&snapshot.download),
        ),
    };
    HostStats {
        name: host.name.clone(),
        status: snapshot.status,
        clients: snapshot.clients,
        connecting: snapshot.connecting,
        upload_bytes,
        download_bytes,
        upload: format_bytes(upload_bytes),
        download: format_bytes(download_bytes),
        uptime: snapshot.uptime.clone(),
        quota_bytes: host.quota_bytes,
        error: snapshot.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceStatus;

    #[test]
    fn test_display_uses_offsets() {
        let host = Host::new("a", "x", "root");
        let snapshot = Snapshot {
            status: ServiceStatus::Running,
            upload: "1 KB".to_string(),
            ..Snapshot::empty("a")
        };
        let record = OffsetRecord {
            upload_offset: 1024,
            download_offset: 0,
            last_upload: 1024,
            last_download: 0,
        };
        let stats = display_stats(&host, &snapshot, Some(&record));
        assert_eq!(stats.upload_bytes, 2048);
        assert_eq!(stats.upload, "2.0 KB");
        assert_eq!(stats.download, "0 B");
    }

    #[test]
    fn test_display_zeroes_failed_host() {
        let host = Host::new("a", "x", "root").with_quota(10);
        let record = OffsetRecord {
            upload_offset: 5,
            ..OffsetRecord::default()
        };
        let stats = display_stats(&host, &Snapshot::failed("a", "boom"), Some(&record));
        assert_eq!(stats.status, ServiceStatus::Error);
        assert_eq!(stats.upload_bytes, 0);
        assert_eq!(stats.error.as_deref(), Some("boom"));
        assert_eq!(stats.quota_bytes, Some(10));
    }
}
