//! Relay monitoring: status parsing, counter bookkeeping, polling,
//! quota enforcement and geo capture
//!
//! Everything here talks to hosts through a
//! [`CommandExecutor`](crate::connection::CommandExecutor) and persists
//! through a [`StatsStore`](crate::storage::StatsStore), so the whole
//! pipeline runs unchanged against scripted transports and in-memory stores.

mod bytes;
mod enforcer;
mod geo;
mod parser;
mod reconcile;
mod scheduler;

pub use bytes::{format_bytes, parse_bytes};
pub use enforcer::{EnforcementOutcome, EnforcementResult, LimitEnforcer, month_start};
pub use geo::{
    GEO_COMMAND, GeoCapture, GeoPipeline, HostGeo, aggregate_counts, normalize_country,
    parse_geo_output,
};
pub use parser::{StatusParser, StatusRule, StatusRules, parse_status};
pub use reconcile::{
    CounterUpdate, DEFAULT_DROP_RATIO, DEFAULT_MIN_RESET_BYTES, Reconciled, Reconciler,
    ResetPolicy, reconcile_counter,
};
pub use scheduler::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_CACHE_TTL, DEFAULT_STATUS_COMMAND,
    PollScheduler, display_stats,
};
