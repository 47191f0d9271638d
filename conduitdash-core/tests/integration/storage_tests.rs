//! SQLite store behavior, checked against the in-memory store

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use conduitdash_core::models::{GEO_AGGREGATE_HOST, GeoRow, OffsetRecord, ServiceStatus, StatsRow};
use conduitdash_core::storage::{IN_MEMORY, MemoryStore, SqliteStore, StatsStore, open_store};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
}

fn stats(host: &str, minute: u32, upload: u64, download: u64) -> StatsRow {
    StatsRow {
        timestamp: at(minute),
        host: host.to_string(),
        status: ServiceStatus::Running,
        clients: 3,
        upload_bytes: upload,
        download_bytes: download,
        uptime: "5m".to_string(),
    }
}

fn geo(host: &str, minute: u32, code: &str, name: &str, count: u64) -> GeoRow {
    GeoRow {
        timestamp: at(minute),
        host: host.to_string(),
        country_code: code.to_string(),
        country_name: name.to_string(),
        count,
    }
}

async fn seed(store: &dyn StatsStore) {
    store.append_stats_row(&stats("b", 3, 30, 300)).await.unwrap();
    store.append_stats_row(&stats("a", 1, 10, 100)).await.unwrap();
    store.append_stats_row(&stats("a", 2, 50, 150)).await.unwrap();
    store.append_stats_row(&stats("a", 5, 40, 900)).await.unwrap();
    store
        .append_geo_rows(&[
            geo("a", 1, "IR", "Iran", 10),
            geo("b", 1, "IR", "Iran", 5),
            geo("b", 1, "DE", "Germany", 7),
            geo(GEO_AGGREGATE_HOST, 1, "IR", "Iran", 15),
            geo(GEO_AGGREGATE_HOST, 1, "DE", "Germany", 7),
            geo("a", 9, "US", "United States", 99),
        ])
        .await
        .unwrap();
}

async fn check_queries(store: &dyn StatsStore) {
    let all = store.query_stats_since(None, at(2)).await.unwrap();
    let order: Vec<(&str, u64)> = all.iter().map(|r| (r.host.as_str(), r.upload_bytes)).collect();
    assert_eq!(order, [("a", 50), ("b", 30), ("a", 40)]);

    let only_a = store.query_stats_since(Some("a"), at(0)).await.unwrap();
    assert_eq!(only_a.len(), 3);
    assert_eq!(only_a[0].timestamp, at(1));
    assert_eq!(only_a[0].status, ServiceStatus::Running);

    assert_eq!(store.max_cumulative("a", at(2)).await.unwrap(), (50, 900));
    assert_eq!(store.max_cumulative_upload("a", at(3)).await.unwrap(), 40);
    assert_eq!(store.max_cumulative("nobody", at(0)).await.unwrap(), (0, 0));

    let countries = store.sum_geo_by_country(at(0)).await.unwrap();
    let summary: Vec<(&str, u64)> = countries.iter().map(|c| (c.code.as_str(), c.count)).collect();
    assert_eq!(summary, [("US", 99), ("IR", 15), ("DE", 7)]);

    let recent = store.sum_geo_by_country(at(5)).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].country, "United States");
}

#[tokio::test]
async fn test_sqlite_matches_memory_store() {
    let sqlite = SqliteStore::open_in_memory().await.unwrap();
    let memory = MemoryStore::new();
    for store in [&sqlite as &dyn StatsStore, &memory as &dyn StatsStore] {
        seed(store).await;
        check_queries(store).await;
    }
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("stats.db");
    let record = OffsetRecord {
        upload_offset: 7,
        download_offset: 8,
        last_upload: 9,
        last_download: 10,
    };

    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.upsert_offset("a", &record).await.unwrap();
        seed(&store).await;
    }

    let store = open_store(&path).await.unwrap();
    assert_eq!(store.get_offset("a").await.unwrap(), record);
    check_queries(store.as_ref()).await;

    assert_eq!(store.delete_all_stats().await.unwrap(), 4);
    assert_eq!(store.delete_all_offsets().await.unwrap(), 1);
    assert!(store.query_stats_since(None, at(0)).await.unwrap().is_empty());
    assert_eq!(store.get_offset("a").await.unwrap(), OffsetRecord::default());
}

#[tokio::test]
async fn test_memory_path_selects_memory_store() {
    let store: Arc<dyn StatsStore> = open_store(Path::new(IN_MEMORY)).await.unwrap();
    store.append_stats_row(&stats("a", 1, 1, 1)).await.unwrap();
    assert_eq!(store.query_stats_since(None, at(0)).await.unwrap().len(), 1);
}
