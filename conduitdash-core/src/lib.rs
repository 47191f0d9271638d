//! `ConduitDash` Core Library
//!
//! Polls a fleet of relay hosts over SSH, turns their status output into
//! cumulative bandwidth counters that survive service restarts, enforces
//! monthly upload quotas and samples the countries of connected peers.
//!
//! # Crate Structure
//!
//! - [`models`] - Hosts, snapshots and persisted records
//! - [`config`] - `config.toml` settings and host list loading
//! - [`transport`] / [`connection`] - SSH sessions, per-host registry, command executor
//! - [`monitoring`] - Status parser, counter reconciler, poll scheduler,
//!   quota enforcer and geo pipeline
//! - [`storage`] - Offset table and append-only history (SQLite or in-memory)
//! - [`service`] - The [`Monitor`] context tying everything together
//! - [`testing`] - Scripted transport for tests

// Enable missing_docs warning for public API documentation
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod service;
pub mod storage;
pub mod testing;
pub mod tracing;
pub mod transport;

pub use config::{AppSettings, ConfigManager, LoadedConfig};
pub use error::{
    ConfigError, ConnectError, ExecError, MonitorError, MonitorResult, StoreError, StoreResult,
};
pub use models::{
    BandwidthUsage, ControlAction, FleetStats, GeoCount, Host, HostStats, OffsetRecord,
    ServiceStatus, Snapshot, StatsRow,
};
pub use service::{ClearedCounts, ControlResult, DEFAULT_QUERY_HOURS, Monitor};
pub use storage::{MemoryStore, SqliteStore, StatsStore};
