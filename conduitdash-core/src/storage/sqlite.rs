//! SQLite-backed store.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{debug, info, instrument, warn};

use super::{IN_MEMORY, StatsStore, migrations, sort_geo_counts};
use crate::error::{StoreError, StoreResult};
use crate::models::{GEO_AGGREGATE_HOST, GeoCount, GeoRow, OffsetRecord, ServiceStatus, StatsRow};

/// Store backed by a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) and migrates the database at `path`
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let in_memory = path == Path::new(IN_MEMORY);
        if !in_memory
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Init(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = if in_memory {
            SqliteConnectOptions::from_str(IN_MEMORY).map_err(|e| StoreError::Init(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        // Every connection to ":memory:" is a separate database, so the
        // in-memory pool holds exactly one connection for its whole life
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Init(e.to_string()))?;

        migrations::run(&pool).await?;
        info!("Stats store ready");
        Ok(Self { pool })
    }

    /// Opens a private in-memory database
    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::open(Path::new(IN_MEMORY)).await
    }
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_stats(row: &SqliteRow) -> StoreResult<StatsRow> {
    let status: String = row.try_get("status")?;
    let status = status.parse().unwrap_or_else(|_| {
        warn!(status = %status, "Unknown status in stats row");
        ServiceStatus::Unknown
    });
    Ok(StatsRow {
        timestamp: millis_to_utc(row.try_get("timestamp")?),
        host: row.try_get("server")?,
        status,
        clients: u32::try_from(row.try_get::<i64, _>("clients")?).unwrap_or(0),
        upload_bytes: from_db(row.try_get("upload_bytes")?),
        download_bytes: from_db(row.try_get("download_bytes")?),
        uptime: row
            .try_get::<Option<String>, _>("uptime")?
            .unwrap_or_default(),
    })
}

fn row_to_offset(row: &SqliteRow) -> StoreResult<OffsetRecord> {
    Ok(OffsetRecord {
        upload_offset: from_db(row.try_get("upload_offset")?),
        download_offset: from_db(row.try_get("download_offset")?),
        last_upload: from_db(row.try_get("last_upload")?),
        last_download: from_db(row.try_get("last_download")?),
    })
}

#[async_trait]
impl StatsStore for SqliteStore {
    async fn get_offset(&self, host: &str) -> StoreResult<OffsetRecord> {
        let row = sqlx::query(
            "SELECT upload_offset, download_offset, last_upload, last_download \
             FROM offsets WHERE server = ?",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_offset(&row),
            None => Ok(OffsetRecord::default()),
        }
    }

    async fn upsert_offset(&self, host: &str, record: &OffsetRecord) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO offsets (server, upload_offset, download_offset, last_upload, last_download)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(server) DO UPDATE SET
                upload_offset = excluded.upload_offset,
                download_offset = excluded.download_offset,
                last_upload = excluded.last_upload,
                last_download = excluded.last_download
            ",
        )
        .bind(host)
        .bind(to_db(record.upload_offset))
        .bind(to_db(record.download_offset))
        .bind(to_db(record.last_upload))
        .bind(to_db(record.last_download))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_offsets(&self) -> StoreResult<Vec<(String, OffsetRecord)>> {
        let rows = sqlx::query(
            "SELECT server, upload_offset, download_offset, last_upload, last_download \
             FROM offsets ORDER BY server",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<(String, OffsetRecord)> {
                Ok((row.try_get("server")?, row_to_offset(row)?))
            })
            .collect()
    }

    async fn append_stats_row(&self, row: &StatsRow) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO stats (timestamp, server, status, clients, upload_bytes, download_bytes, uptime)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(row.timestamp.timestamp_millis())
        .bind(&row.host)
        .bind(row.status.as_str())
        .bind(i64::from(row.clients))
        .bind(to_db(row.upload_bytes))
        .bind(to_db(row.download_bytes))
        .bind(&row.uptime)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_stats_since(
        &self,
        host: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<StatsRow>> {
        let rows = match host {
            Some(host) => {
                sqlx::query(
                    "SELECT * FROM stats WHERE server = ? AND timestamp >= ? \
                     ORDER BY timestamp, id",
                )
                .bind(host)
                .bind(since.timestamp_millis())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM stats WHERE timestamp >= ? ORDER BY timestamp, id")
                    .bind(since.timestamp_millis())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_stats).collect()
    }

    async fn max_cumulative(&self, host: &str, since: DateTime<Utc>) -> StoreResult<(u64, u64)> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(upload_bytes), 0) AS up, COALESCE(MAX(download_bytes), 0) AS down \
             FROM stats WHERE server = ? AND timestamp >= ?",
        )
        .bind(host)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok((
            from_db(row.try_get("up")?),
            from_db(row.try_get("down")?),
        ))
    }

    async fn append_geo_row(&self, row: &GeoRow) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO geo_stats (timestamp, server, country_code, country_name, count)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(row.timestamp.timestamp_millis())
        .bind(&row.host)
        .bind(&row.country_code)
        .bind(&row.country_name)
        .bind(to_db(row.count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_geo_rows(&self, rows: &[GeoRow]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r"
                INSERT INTO geo_stats (timestamp, server, country_code, country_name, count)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(row.timestamp.timestamp_millis())
            .bind(&row.host)
            .bind(&row.country_code)
            .bind(&row.country_name)
            .bind(to_db(row.count))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(rows = rows.len(), "Geo rows stored");
        Ok(())
    }

    async fn sum_geo_by_country(&self, since: DateTime<Utc>) -> StoreResult<Vec<GeoCount>> {
        let rows = sqlx::query(
            r"
            SELECT country_code, MAX(country_name) AS country_name, SUM(count) AS total
            FROM geo_stats
            WHERE timestamp >= ? AND server != ?
            GROUP BY country_code
            ",
        )
        .bind(since.timestamp_millis())
        .bind(GEO_AGGREGATE_HOST)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = rows
            .iter()
            .map(|row| -> StoreResult<GeoCount> {
                Ok(GeoCount {
                    code: row.try_get("country_code")?,
                    country: row.try_get("country_name")?,
                    count: from_db(row.try_get("total")?),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        sort_geo_counts(&mut counts);
        Ok(counts)
    }

    async fn delete_all_stats(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM stats").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_offsets(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM offsets").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
