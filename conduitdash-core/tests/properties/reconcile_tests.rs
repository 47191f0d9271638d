//! Property-based tests for counter reconciliation

use chrono::{TimeDelta, Utc};
use conduitdash_core::models::{ServiceStatus, Snapshot};
use conduitdash_core::monitoring::{Reconciler, ResetPolicy, format_bytes, reconcile_counter};
use conduitdash_core::storage::MemoryStore;
use conduitdash_core::StatsStore;
use proptest::prelude::*;
use std::sync::Arc;

const MIB: u64 = 1024 * 1024;

// ========== Strategies ==========

/// One service lifetime: starts small, grows, ends above the reset floor
#[derive(Debug, Clone)]
struct Lifetime {
    start: u64,
    increments: Vec<u64>,
}

impl Lifetime {
    fn readings(&self) -> Vec<u64> {
        let mut value = self.start;
        let mut readings = vec![value];
        for inc in &self.increments {
            value += inc;
            readings.push(value);
        }
        // make sure the next lifetime's first reading is a detectable drop
        readings.push(value + 4 * MIB);
        readings
    }
}

fn arb_lifetime() -> impl Strategy<Value = Lifetime> {
    (0..MIB, prop::collection::vec(0u64..(1 << 30), 0..8))
        .prop_map(|(start, increments)| Lifetime { start, increments })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Across restarts the cumulative total is the sum of every lifetime
    #[test]
    fn prop_cumulative_is_monotonic_across_restarts(
        lifetimes in prop::collection::vec(arb_lifetime(), 1..6)
    ) {
        let policy = ResetPolicy::default();
        let (mut offset, mut last, mut previous) = (0u64, 0u64, 0u64);
        let mut finished = 0u64;

        for lifetime in &lifetimes {
            for session in lifetime.readings() {
                let update = reconcile_counter(offset, last, session, &policy);
                prop_assert!(update.offset >= offset, "offset went down");
                prop_assert!(update.cumulative >= previous, "cumulative went down");
                prop_assert_eq!(update.cumulative, finished + session);
                offset = update.offset;
                last = session;
                previous = update.cumulative;
            }
            finished += last;
        }
    }

    /// Offsets never decrease, whatever the readings
    #[test]
    fn prop_offsets_never_decrease(readings in prop::collection::vec(any::<u32>(), 1..30)) {
        let policy = ResetPolicy::default();
        let (mut offset, mut last) = (0u64, 0u64);
        for session in readings.into_iter().map(u64::from) {
            let update = reconcile_counter(offset, last, session, &policy);
            prop_assert!(update.offset >= offset);
            prop_assert_eq!(update.cumulative, update.offset + session);
            offset = update.offset;
            last = session;
        }
    }

    /// Drops from at or below the floor are never resets
    #[test]
    fn prop_sub_floor_dip_is_not_reset(last in 0..=MIB, session in 0..=MIB, offset in 0u64..(1 << 40)) {
        let update = reconcile_counter(offset, last, session, &ResetPolicy::default());
        prop_assert!(!update.reset);
        prop_assert_eq!(update.offset, offset);
    }

    /// A drop of less than half is not a reset
    #[test]
    fn prop_shallow_drop_is_not_reset(last in (2 * MIB)..(1u64 << 40), percent in 50u64..=100) {
        let session = last * percent / 100 + 1;
        prop_assert!(!ResetPolicy::default().is_reset(last, session.min(last)));
    }
}

#[test]
fn test_reset_thresholds() {
    let policy = ResetPolicy::default();
    assert!(policy.is_reset(10 * MIB, 4 * MIB));
    assert!(!policy.is_reset(10 * MIB, 6 * MIB));
    assert!(!policy.is_reset(500 * 1024, 0));
}

fn snapshot(upload: u64) -> Snapshot {
    Snapshot {
        status: ServiceStatus::Running,
        upload: format_bytes(upload),
        download: "0 B".to_string(),
        ..Snapshot::empty("a")
    }
}

#[tokio::test]
async fn test_reconciler_history_is_non_decreasing() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = Reconciler::new(store.clone(), ResetPolicy::default());
    let start = Utc::now() - TimeDelta::hours(1);

    let readings = [MIB, 8 * MIB, 20 * MIB, 0, 3 * MIB, 12 * MIB, MIB];
    for (minute, upload) in readings.into_iter().enumerate() {
        let at = start + TimeDelta::minutes(minute as i64);
        reconciler.reconcile(&snapshot(upload), at).await.unwrap();
    }
    reconciler
        .reconcile(&Snapshot::failed("a", "timeout"), start + TimeDelta::minutes(30))
        .await
        .unwrap();

    let rows = store.stats_rows().await;
    assert_eq!(rows.len(), readings.len() + 1);
    assert!(rows.windows(2).all(|w| w[0].upload_bytes <= w[1].upload_bytes));
    assert_eq!(rows.last().unwrap().upload_bytes, 20 * MIB + 12 * MIB + MIB);
    assert_eq!(rows.last().unwrap().status, ServiceStatus::Error);

    let record = store.get_offset("a").await.unwrap();
    assert_eq!(record.upload_offset, 32 * MIB);
    assert_eq!(record.last_upload, MIB);
}
