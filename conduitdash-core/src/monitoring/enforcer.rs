//! Monthly upload quota enforcement
//!
//! Usage is the highest cumulative upload recorded since the first of the
//! current calendar month (local time). Download is not metered. A host at
//! or over its quota gets a stop command on every check; stopping an already
//! stopped service is harmless, so repeated checks converge on the same state.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::bytes::format_bytes;
use crate::connection::CommandExecutor;
use crate::error::StoreResult;
use crate::models::{BandwidthUsage, ControlAction, Host};
use crate::storage::StatsStore;

/// What happened to one host during a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnforcementOutcome {
    /// Usage is below the quota
    UnderQuota {
        /// Month-to-date upload
        used: u64,
        /// Monthly quota
        quota: u64,
    },
    /// The stop command was issued
    Stopped {
        /// Month-to-date upload
        used: u64,
        /// Monthly quota
        quota: u64,
    },
    /// The host is over quota but the stop command failed
    StopFailed {
        /// Month-to-date upload
        used: u64,
        /// Monthly quota
        quota: u64,
        /// Failure description
        error: String,
    },
    /// Usage could not be read
    CheckFailed {
        /// Failure description
        error: String,
    },
}

/// Check result for one host with a quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementResult {
    /// Host name
    pub host: String,
    /// What happened
    #[serde(flatten)]
    pub outcome: EnforcementOutcome,
}

/// Longest DST transition skipped when resolving local midnight
const MAX_GAP_HOURS: i64 = 2;

/// Returns the first instant of the calendar month containing `now`
#[must_use]
pub fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_else(|| now.naive_local());
    first_existing_instant(first, |local| {
        tz.from_local_datetime(local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Resolves local midnight, stepping past a DST gap that swallows it
fn first_existing_instant<F>(midnight: NaiveDateTime, resolve: F) -> DateTime<Utc>
where
    F: Fn(&NaiveDateTime) -> Option<DateTime<Utc>>,
{
    (0..=MAX_GAP_HOURS)
        .find_map(|h| resolve(&(midnight + TimeDelta::hours(h))))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Compares month-to-date usage against quotas and stops offenders
#[derive(Clone)]
pub struct LimitEnforcer {
    executor: CommandExecutor,
    store: Arc<dyn StatsStore>,
    unit: String,
}

impl LimitEnforcer {
    /// Creates an enforcer controlling the given systemd unit
    #[must_use]
    pub fn new(
        executor: CommandExecutor,
        store: Arc<dyn StatsStore>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            store,
            unit: unit.into(),
        }
    }

    /// Checks every host with a quota against the current local month
    pub async fn enforce(&self, hosts: &[Host]) -> Vec<EnforcementResult> {
        self.enforce_since(hosts, month_start(&Local::now())).await
    }

    /// Checks every host with a quota against usage recorded since `since`
    #[instrument(name = "enforce.check", skip(self, hosts), fields(since = %since))]
    pub async fn enforce_since(
        &self,
        hosts: &[Host],
        since: DateTime<Utc>,
    ) -> Vec<EnforcementResult> {
        let checks = hosts.iter().filter_map(|host| {
            host.quota_bytes
                .map(|quota| self.check_host(host, quota, since))
        });
        join_all(checks).await
    }

    async fn check_host(&self, host: &Host, quota: u64, since: DateTime<Utc>) -> EnforcementResult {
        let outcome = match self.store.max_cumulative_upload(&host.name, since).await {
            Err(e) => {
                warn!(host = %host.name, error = %e, "Failed to read monthly usage");
                EnforcementOutcome::CheckFailed {
                    error: e.to_string(),
                }
            }
            Ok(used) if used < quota => EnforcementOutcome::UnderQuota { used, quota },
            Ok(used) => {
                info!(
                    host = %host.name,
                    used,
                    quota,
                    "Monthly quota reached ({} of {}), stopping service",
                    format_bytes(used),
                    format_bytes(quota),
                );
                let command = ControlAction::Stop.command(&self.unit);
                match self.executor.exec(host, &command).await {
                    Ok(_) => EnforcementOutcome::Stopped { used, quota },
                    Err(e) => {
                        warn!(host = %host.name, error = %e, "Failed to stop over-quota host");
                        EnforcementOutcome::StopFailed {
                            used,
                            quota,
                            error: e.to_string(),
                        }
                    }
                }
            }
        };
        EnforcementResult {
            host: host.name.clone(),
            outcome,
        }
    }

    /// Month-to-date usage of every host against the current local month
    pub async fn usage(&self, hosts: &[Host]) -> StoreResult<Vec<BandwidthUsage>> {
        self.usage_since(hosts, month_start(&Local::now())).await
    }

    /// Usage of every host since `since`, in host order
    pub async fn usage_since(
        &self,
        hosts: &[Host],
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<BandwidthUsage>> {
        let mut report = Vec::with_capacity(hosts.len());
        for host in hosts {
            let (upload, download) = self.store.max_cumulative(&host.name, since).await?;
            report.push(BandwidthUsage::new(
                host.name.clone(),
                upload,
                download,
                host.quota_bytes,
            ));
        }
        Ok(report)
    }
}
