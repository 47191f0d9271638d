//! Quota enforcement against recorded history

use chrono::{TimeDelta, TimeZone, Utc};
use conduitdash_core::StatsStore;
use conduitdash_core::models::{Host, ServiceStatus, StatsRow, TIB};
use conduitdash_core::monitoring::{EnforcementOutcome, LimitEnforcer};
use conduitdash_core::testing::{ScriptedReply, ScriptedTransport};

use super::{executor, memory_store};

fn row(host: &str, hours_ago: i64, upload: u64, download: u64) -> StatsRow {
    StatsRow {
        timestamp: Utc::now() - TimeDelta::hours(hours_ago),
        host: host.to_string(),
        status: ServiceStatus::Running,
        clients: 1,
        upload_bytes: upload,
        download_bytes: download,
        uptime: "1h".to_string(),
    }
}

fn hosts() -> Vec<Host> {
    vec![
        Host::new("over", "10.0.0.1", "root").with_quota(TIB),
        Host::new("under", "10.0.0.2", "root").with_quota(TIB),
        Host::new("unlimited", "10.0.0.3", "root"),
    ]
}

#[tokio::test]
async fn test_enforcement_is_idempotent() {
    let transport = ScriptedTransport::new(|_, _| ScriptedReply::output(""));
    let (_, store) = memory_store();
    store.append_stats_row(&row("over", 1, TIB, 0)).await.unwrap();
    store.append_stats_row(&row("under", 1, TIB - 1, 0)).await.unwrap();
    store.append_stats_row(&row("unlimited", 1, 50 * TIB, 0)).await.unwrap();

    let enforcer = LimitEnforcer::new(executor(&transport), store, "conduit");
    let since = Utc::now() - TimeDelta::days(1);

    for round in 1..=2 {
        let results = enforcer.enforce_since(&hosts(), since).await;
        assert_eq!(results.len(), 2, "hosts without a quota are skipped");
        assert_eq!(results[0].host, "over");
        assert_eq!(
            results[0].outcome,
            EnforcementOutcome::Stopped {
                used: TIB,
                quota: TIB
            }
        );
        assert_eq!(
            results[1].outcome,
            EnforcementOutcome::UnderQuota {
                used: TIB - 1,
                quota: TIB
            }
        );

        let stops = transport.calls_matching("systemctl stop conduit");
        assert_eq!(stops.len(), round);
        assert!(stops.iter().all(|c| c.host == "over"));
    }
}

#[tokio::test]
async fn test_usage_outside_window_is_ignored() {
    let transport = ScriptedTransport::new(|_, _| ScriptedReply::output(""));
    let (_, store) = memory_store();
    store.append_stats_row(&row("over", 48, 2 * TIB, 0)).await.unwrap();
    store.append_stats_row(&row("over", 1, 10, 0)).await.unwrap();

    let enforcer = LimitEnforcer::new(executor(&transport), store, "conduit");
    let results = enforcer
        .enforce_since(&hosts(), Utc::now() - TimeDelta::hours(24))
        .await;

    assert_eq!(
        results[0].outcome,
        EnforcementOutcome::UnderQuota {
            used: 10,
            quota: TIB
        }
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_failed_stop_does_not_affect_other_hosts() {
    let transport = ScriptedTransport::new(|_, _| ScriptedReply::output(""));
    transport.fail_connect("over");
    let (_, store) = memory_store();
    store.append_stats_row(&row("over", 1, 2 * TIB, 0)).await.unwrap();
    store.append_stats_row(&row("under", 1, 3 * TIB, 0)).await.unwrap();

    let enforcer = LimitEnforcer::new(executor(&transport), store, "relay");
    let results = enforcer
        .enforce_since(&hosts(), Utc::now() - TimeDelta::days(1))
        .await;

    assert!(matches!(
        results[0].outcome,
        EnforcementOutcome::StopFailed { used, .. } if used == 2 * TIB
    ));
    assert!(matches!(results[1].outcome, EnforcementOutcome::Stopped { .. }));
    assert_eq!(transport.calls_matching("systemctl stop relay").len(), 1);
}

#[tokio::test]
async fn test_usage_report_percent() {
    let transport = ScriptedTransport::new(|_, _| ScriptedReply::output(""));
    let (_, store) = memory_store();
    store.append_stats_row(&row("over", 2, TIB / 8, 5)).await.unwrap();
    store.append_stats_row(&row("over", 1, TIB / 4, 9)).await.unwrap();

    let enforcer = LimitEnforcer::new(executor(&transport), store, "conduit");
    let since = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
    let report = enforcer.usage_since(&hosts(), since).await.unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report[0].upload_bytes, TIB / 4);
    assert_eq!(report[0].download_bytes, 9);
    assert_eq!(report[0].total_bytes, TIB / 4);
    assert!((report[0].percent - 25.0).abs() < f64::EPSILON);
    assert_eq!(report[1].upload_bytes, 0);
    assert!(report[2].percent.abs() < f64::EPSILON);
}
