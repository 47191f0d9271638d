//! Database migrations.

use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::{StoreError, StoreResult};

/// Schema version written by the latest migration
pub const SCHEMA_VERSION: i64 = 2;

fn migration_err(err: sqlx::Error) -> StoreError {
    StoreError::Migration(err.to_string())
}

/// Brings the schema up to [`SCHEMA_VERSION`]
#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(migration_err)?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(migration_err)?;
    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!(version = current_version, "Stats schema is up to date");
        return Ok(());
    }

    info!(
        from = current_version,
        to = SCHEMA_VERSION,
        "Migrating stats database"
    );

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }
    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    Ok(())
}

async fn set_version(pool: &SqlitePool, version: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(migration_err)?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(migration_err)?;
    Ok(())
}

/// Stats history and offsets
#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> StoreResult<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            server TEXT NOT NULL,
            status TEXT NOT NULL,
            clients INTEGER NOT NULL DEFAULT 0,
            upload_bytes INTEGER NOT NULL DEFAULT 0,
            download_bytes INTEGER NOT NULL DEFAULT 0,
            uptime TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(migration_err)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stats_timestamp ON stats(timestamp)")
        .execute(pool)
        .await
        .map_err(migration_err)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stats_server ON stats(server)")
        .execute(pool)
        .await
        .map_err(migration_err)?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS offsets (
            server TEXT PRIMARY KEY,
            upload_offset INTEGER NOT NULL DEFAULT 0,
            download_offset INTEGER NOT NULL DEFAULT 0,
            last_upload INTEGER NOT NULL DEFAULT 0,
            last_download INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(migration_err)?;

    set_version(pool, 1).await
}

/// Geo samples
#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> StoreResult<()> {
    info!("Running migration to schema version 2");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS geo_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            server TEXT NOT NULL,
            country_code TEXT NOT NULL,
            country_name TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(migration_err)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_geo_timestamp ON geo_stats(timestamp)")
        .execute(pool)
        .await
        .map_err(migration_err)?;

    set_version(pool, 2).await
}
