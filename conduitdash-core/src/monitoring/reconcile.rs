//! Cumulative counter reconciliation
//!
//! The relay service reports counters that start from zero whenever it is
//! restarted. Each host keeps an offset per direction; when the session
//! value drops sharply below the previous one, the previous value is folded
//! into the offset so the cumulative total keeps growing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::bytes::{format_bytes, parse_bytes};
use crate::error::StoreResult;
use crate::models::{OffsetRecord, Snapshot, StatsRow};
use crate::storage::StatsStore;

/// Default fraction of the previous value below which a drop counts as a reset
pub const DEFAULT_DROP_RATIO: f64 = 0.5;

/// Default previous value (1 MiB) that must be exceeded for a reset to count
pub const DEFAULT_MIN_RESET_BYTES: u64 = 1024 * 1024;

/// Thresholds deciding when a counter drop is a service restart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResetPolicy {
    /// A drop to below `last * drop_ratio` is a reset
    pub drop_ratio: f64,
    /// Drops from values at or below this floor are never resets
    pub min_bytes: u64,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            drop_ratio: DEFAULT_DROP_RATIO,
            min_bytes: DEFAULT_MIN_RESET_BYTES,
        }
    }
}

impl ResetPolicy {
    /// Returns true if going from `last` to `session` is a reset
    #[must_use]
    pub fn is_reset(&self, last: u64, session: u64) -> bool {
        last > self.min_bytes && (session as f64) < (last as f64) * self.drop_ratio
    }
}

/// Result of reconciling one direction of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    /// Offset to persist
    pub offset: u64,
    /// Cumulative value, `offset + session`
    pub cumulative: u64,
    /// Whether a reset was detected
    pub reset: bool,
}

/// Reconciles one counter direction
#[must_use]
pub fn reconcile_counter(
    offset: u64,
    last: u64,
    session: u64,
    policy: &ResetPolicy,
) -> CounterUpdate {
    let reset = policy.is_reset(last, session);
    let offset = if reset {
        offset.saturating_add(last)
    } else {
        offset
    };
    CounterUpdate {
        offset,
        cumulative: offset.saturating_add(session),
        reset,
    }
}

/// Cumulative totals produced for one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// Cumulative upload in bytes
    pub upload: u64,
    /// Cumulative download in bytes
    pub download: u64,
    /// Offset record after this poll
    pub record: OffsetRecord,
}

/// Applies snapshots to the offset table and the stats history
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn StatsStore>,
    policy: ResetPolicy,
}

impl Reconciler {
    /// Creates a reconciler writing to `store`
    #[must_use]
    pub fn new(store: Arc<dyn StatsStore>, policy: ResetPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns the active reset policy
    #[must_use]
    pub const fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// Reconciles one snapshot: upserts the offset record, then appends a stats row
    ///
    /// Snapshots of hosts that could not be polled leave the offset record
    /// untouched and record the last known cumulative values, so a failed
    /// poll is never mistaken for a counter reset.
    #[instrument(skip(self, snapshot), fields(host = %snapshot.host))]
    pub async fn reconcile(
        &self,
        snapshot: &Snapshot,
        at: DateTime<Utc>,
    ) -> StoreResult<Reconciled> {
        let previous = self.store.get_offset(&snapshot.host).await?;

        let (record, upload, download) = if snapshot.is_error() {
            (
                previous,
                previous.cumulative_upload(),
                previous.cumulative_download(),
            )
        } else {
            let session_up = parse_bytes(&snapshot.upload);
            let session_down = parse_bytes(&snapshot.download);
            let up = reconcile_counter(
                previous.upload_offset,
                previous.last_upload,
                session_up,
                &self.policy,
            );
            let down = reconcile_counter(
                previous.download_offset,
                previous.last_download,
                session_down,
                &self.policy,
            );

            if up.reset {
                info!(
                    host = %snapshot.host,
                    last = previous.last_upload,
                    session = session_up,
                    offset = up.offset,
                    "Upload counter reset detected ({} -> {})",
                    format_bytes(previous.last_upload),
                    format_bytes(session_up),
                );
            }
            if down.reset {
                info!(
                    host = %snapshot.host,
                    last = previous.last_download,
                    session = session_down,
                    offset = down.offset,
                    "Download counter reset detected ({} -> {})",
                    format_bytes(previous.last_download),
                    format_bytes(session_down),
                );
            }

            let record = OffsetRecord {
                upload_offset: up.offset,
                download_offset: down.offset,
                last_upload: session_up,
                last_download: session_down,
            };
            self.store.upsert_offset(&snapshot.host, &record).await?;
            (record, up.cumulative, down.cumulative)
        };

        self.store
            .append_stats_row(&StatsRow {
                timestamp: at,
                host: snapshot.host.clone(),
                status: snapshot.status,
                clients: snapshot.clients,
                upload_bytes: upload,
                download_bytes: download,
                uptime: snapshot.uptime.clone(),
            })
            .await?;

        Ok(Reconciled {
            upload,
            download,
            record,
        })
    }
}
