mod enforcer_tests;
mod geo_tests;
mod registry_tests;
mod scheduler_tests;
mod storage_tests;

use std::sync::Arc;

use conduitdash_core::StatsStore;
use conduitdash_core::connection::{CommandExecutor, ConnectionRegistry};
use conduitdash_core::models::Host;
use conduitdash_core::storage::MemoryStore;
use conduitdash_core::testing::ScriptedTransport;
use conduitdash_core::transport::ConnectOptions;

/// Hosts `h0..h{n-1}` without quotas
pub fn fleet(n: usize) -> Vec<Host> {
    (0..n)
        .map(|i| Host::new(format!("h{i}"), format!("10.0.0.{}", i + 1), "root"))
        .collect()
}

/// Status output of a running relay with the given session counters
pub fn running(up: &str, down: &str) -> String {
    format!(
        "\u{25cf} conduit.service - Conduit relay\n   Active: active (running) since Mon\n\
         [STATS] Connecting: 2 | Connected: 7 | Up: {up} | Down: {down} | Uptime: 3h12m\n"
    )
}

/// Executor over `transport` with default timeouts
pub fn executor(transport: &ScriptedTransport) -> CommandExecutor {
    let registry = ConnectionRegistry::new(
        Arc::new(transport.clone()),
        ConnectOptions::new("/dev/null"),
    );
    CommandExecutor::new(registry)
}

/// Fresh in-memory store, both as its concrete type and as a trait object
pub fn memory_store() -> (Arc<MemoryStore>, Arc<dyn StatsStore>) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn StatsStore> = store.clone();
    (store, shared)
}
