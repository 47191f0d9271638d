//! Persistence for offsets, stats history and geo samples
//!
//! The store is two append-only time series (stats rows and geo rows) plus
//! a single-row-per-host offset table. [`SqliteStore`] is used by the daemon;
//! [`MemoryStore`] backs tests and `:memory:` configurations.

mod memory;
pub mod migrations;
mod sqlite;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::models::{GeoCount, GeoRow, OffsetRecord, StatsRow};

/// Path value selecting an in-memory store
pub const IN_MEMORY: &str = ":memory:";

/// Storage interface used by the reconciler, enforcer and geo pipeline
///
/// Writes are independent statements; nothing here is transactional across
/// calls.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Returns the offset record of a host, all zeros if none is stored
    async fn get_offset(&self, host: &str) -> StoreResult<OffsetRecord>;

    /// Inserts or replaces the offset record of a host
    async fn upsert_offset(&self, host: &str, record: &OffsetRecord) -> StoreResult<()>;

    /// Returns every stored offset record, ordered by host name
    async fn list_offsets(&self) -> StoreResult<Vec<(String, OffsetRecord)>>;

    /// Appends one stats row
    async fn append_stats_row(&self, row: &StatsRow) -> StoreResult<()>;

    /// Returns stats rows at or after `since`, oldest first, optionally for one host
    async fn query_stats_since(
        &self,
        host: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<StatsRow>>;

    /// Highest cumulative upload of a host at or after `since`, 0 without rows
    async fn max_cumulative_upload(&self, host: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.max_cumulative(host, since).await?.0)
    }

    /// Highest cumulative `(upload, download)` of a host at or after `since`
    async fn max_cumulative(&self, host: &str, since: DateTime<Utc>) -> StoreResult<(u64, u64)>;

    /// Appends one geo row
    async fn append_geo_row(&self, row: &GeoRow) -> StoreResult<()>;

    /// Appends several geo rows
    async fn append_geo_rows(&self, rows: &[GeoRow]) -> StoreResult<()> {
        for row in rows {
            self.append_geo_row(row).await?;
        }
        Ok(())
    }

    /// Sums per-host geo counts at or after `since` by country, largest first
    ///
    /// Fleet aggregate rows are excluded so that nothing is counted twice.
    async fn sum_geo_by_country(&self, since: DateTime<Utc>) -> StoreResult<Vec<GeoCount>>;

    /// Deletes every stats row, returning the number removed
    async fn delete_all_stats(&self) -> StoreResult<u64>;

    /// Deletes every offset record, returning the number removed
    async fn delete_all_offsets(&self) -> StoreResult<u64>;
}

/// Opens the store configured by `path`
///
/// `":memory:"` selects [`MemoryStore`]; anything else is a SQLite file.
pub async fn open_store(path: &Path) -> StoreResult<Arc<dyn StatsStore>> {
    if path == Path::new(IN_MEMORY) {
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::open(path).await?))
}

/// Sorts country tallies by count descending, then code ascending
pub(crate) fn sort_geo_counts(counts: &mut [GeoCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
}
