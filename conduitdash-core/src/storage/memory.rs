//! In-process store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{StatsStore, sort_geo_counts};
use crate::error::StoreResult;
use crate::models::{GEO_AGGREGATE_HOST, GeoCount, GeoRow, OffsetRecord, StatsRow};

/// Store that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    offsets: RwLock<BTreeMap<String, OffsetRecord>>,
    stats: RwLock<Vec<StatsRow>>,
    geo: RwLock<Vec<GeoRow>>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stats row in insertion order
    pub async fn stats_rows(&self) -> Vec<StatsRow> {
        self.stats.read().await.clone()
    }

    /// Returns every geo row in insertion order
    pub async fn geo_rows(&self) -> Vec<GeoRow> {
        self.geo.read().await.clone()
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn get_offset(&self, host: &str) -> StoreResult<OffsetRecord> {
        Ok(self
            .offsets
            .read()
            .await
            .get(host)
            .copied()
            .unwrap_or_default())
    }

    async fn upsert_offset(&self, host: &str, record: &OffsetRecord) -> StoreResult<()> {
        self.offsets
            .write()
            .await
            .insert(host.to_string(), *record);
        Ok(())
    }

    async fn list_offsets(&self) -> StoreResult<Vec<(String, OffsetRecord)>> {
        Ok(self
            .offsets
            .read()
            .await
            .iter()
            .map(|(host, rec)| (host.clone(), *rec))
            .collect())
    }

    async fn append_stats_row(&self, row: &StatsRow) -> StoreResult<()> {
        self.stats.write().await.push(row.clone());
        Ok(())
    }

    async fn query_stats_since(
        &self,
        host: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<StatsRow>> {
        let mut rows: Vec<StatsRow> = self
            .stats
            .read()
            .await
            .iter()
            .filter(|r| r.timestamp >= since)
            .filter(|r| host.is_none_or(|h| r.host == h))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn max_cumulative(&self, host: &str, since: DateTime<Utc>) -> StoreResult<(u64, u64)> {
        Ok(self
            .stats
            .read()
            .await
            .iter()
            .filter(|r| r.host == host && r.timestamp >= since)
            .fold((0, 0), |(up, down), r| {
                (up.max(r.upload_bytes), down.max(r.download_bytes))
            }))
    }

    async fn append_geo_row(&self, row: &GeoRow) -> StoreResult<()> {
        self.geo.write().await.push(row.clone());
        Ok(())
    }

    async fn sum_geo_by_country(&self, since: DateTime<Utc>) -> StoreResult<Vec<GeoCount>> {
        let mut totals: HashMap<String, GeoCount> = HashMap::new();
        for row in self.geo.read().await.iter() {
            if row.host == GEO_AGGREGATE_HOST || row.timestamp < since {
                continue;
            }
            let entry = totals
                .entry(row.country_code.clone())
                .or_insert_with(|| GeoCount {
                    code: row.country_code.clone(),
                    country: row.country_name.clone(),
                    count: 0,
                });
            entry.count += row.count;
            if row.country_name > entry.country {
                entry.country.clone_from(&row.country_name);
            }
        }

        let mut counts: Vec<GeoCount> = totals.into_values().collect();
        sort_geo_counts(&mut counts);
        Ok(counts)
    }

    async fn delete_all_stats(&self) -> StoreResult<u64> {
        let mut stats = self.stats.write().await;
        let removed = stats.len() as u64;
        stats.clear();
        Ok(removed)
    }

    async fn delete_all_offsets(&self) -> StoreResult<u64> {
        let mut offsets = self.offsets.write().await;
        let removed = offsets.len() as u64;
        offsets.clear();
        Ok(removed)
    }
}
