//! Data model: hosts, snapshots and persisted records.

mod host;
mod records;
mod snapshot;

pub use host::{DEFAULT_SSH_PORT, Host, TIB};
pub use records::{
    BandwidthUsage, ControlAction, GEO_AGGREGATE_HOST, GeoCount, GeoRow, OffsetRecord, StatsRow,
};
pub use snapshot::{FleetStats, HostStats, ServiceStatus, Snapshot, UPTIME_UNKNOWN, ZERO_BYTES};
