//! Poll scheduler: batch pacing, degraded hosts, caching and reconciliation

use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduitdash_core::models::ServiceStatus;
use conduitdash_core::monitoring::{PollScheduler, Reconciler, ResetPolicy};
use conduitdash_core::testing::{ScriptedReply, ScriptedTransport};
use tokio::time::Instant;

use super::{executor, fleet, memory_store, running};

fn scheduler(transport: &ScriptedTransport, hosts: usize) -> PollScheduler {
    let (_, store) = memory_store();
    let reconciler = Reconciler::new(Arc::clone(&store), ResetPolicy::default());
    PollScheduler::new(fleet(hosts), executor(transport), reconciler, store)
}

fn relay(_host: &str, _command: &str) -> ScriptedReply {
    ScriptedReply::output(running("1.0 MB", "512.0 KB"))
}

#[tokio::test(start_paused = true)]
async fn test_seven_hosts_run_in_paced_batches() {
    let transport =
        ScriptedTransport::with_delays(relay, Duration::ZERO, Duration::from_millis(100));
    let scheduler = scheduler(&transport, 7).with_cache_ttl(Duration::ZERO);

    let start = Instant::now();
    let stats = scheduler.fetch_all().await;
    assert_eq!(stats.hosts.len(), 7);

    let offsets: Vec<(String, u128)> = transport
        .calls()
        .into_iter()
        .map(|c| (c.host, (c.at - start).as_millis()))
        .collect();
    assert_eq!(offsets.len(), 7);

    // 100 ms of work per batch plus the 500 ms pause
    for (host, at) in &offsets {
        let expected = match host.as_str() {
            "h0" | "h1" | "h2" => 0,
            "h3" | "h4" | "h5" => 600,
            "h6" => 1200,
            other => panic!("unexpected host {other}"),
        };
        assert_eq!(*at, expected, "host {host}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_in_second_batch_does_not_affect_third() {
    let transport = ScriptedTransport::with_delays(
        |host, command| {
            if host == "h4" {
                ScriptedReply::channel_error(format!("{command}: broken pipe"))
            } else {
                relay(host, command)
            }
        },
        Duration::ZERO,
        Duration::from_millis(100),
    );
    transport.fail_connect("h3");
    let scheduler = scheduler(&transport, 7);

    let start = Instant::now();
    let stats = scheduler.fetch_all().await;

    // Same pacing as a fleet without failures
    let started_at = |name: &str| {
        transport
            .calls()
            .into_iter()
            .find(|c| c.host == name)
            .map(|c| (c.at - start).as_millis())
    };
    assert_eq!(started_at("h3"), None);
    assert_eq!(started_at("h4"), Some(600));
    assert_eq!(started_at("h5"), Some(600));
    assert_eq!(started_at("h6"), Some(1200));

    let names: Vec<&str> = stats.hosts.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, ["h0", "h1", "h2", "h3", "h4", "h5", "h6"]);

    for failed in ["h3", "h4"] {
        let host = stats.get(failed).unwrap();
        assert_eq!(host.status, ServiceStatus::Error);
        assert_eq!(host.upload_bytes, 0);
        assert_eq!(host.upload, "0 B");
        assert!(host.error.is_some());
    }
    for ok in ["h0", "h2", "h5", "h6"] {
        let host = stats.get(ok).unwrap();
        assert_eq!(host.status, ServiceStatus::Running);
        assert_eq!(host.clients, 7);
        assert_eq!(host.connecting, 2);
        assert_eq!(host.upload_bytes, 1024 * 1024);
    }
    assert_eq!(stats.error_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_serves_until_ttl_expires() {
    let transport = ScriptedTransport::new(relay);
    let scheduler = scheduler(&transport, 2).with_cache_ttl(Duration::from_secs(5));

    let first = scheduler.fetch_all().await;
    tokio::time::advance(Duration::from_secs(4)).await;
    let second = scheduler.fetch_all().await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.calls().len(), 2);

    tokio::time::advance(Duration::from_secs(2)).await;
    let third = scheduler.fetch_all().await;
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_poll() {
    let transport = ScriptedTransport::new(relay);
    let scheduler = scheduler(&transport, 1);

    scheduler.fetch_all().await;
    scheduler.fetch_all().await;
    assert_eq!(transport.calls().len(), 1);

    scheduler.invalidate_cache();
    scheduler.fetch_all().await;
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_service_restart_keeps_totals_growing() {
    let output = Arc::new(Mutex::new(running("10.0 MB", "20.0 MB")));
    let current = Arc::clone(&output);
    let transport =
        ScriptedTransport::new(move |_, _| ScriptedReply::output(current.lock().unwrap().clone()));
    let scheduler = scheduler(&transport, 1).with_cache_ttl(Duration::ZERO);

    let before = scheduler.fetch_all().await;
    assert_eq!(before.hosts[0].upload_bytes, 10 * 1024 * 1024);

    *output.lock().unwrap() = running("4.0 MB", "1.0 MB");
    let after = scheduler.fetch_all().await;
    assert_eq!(after.hosts[0].upload_bytes, 14 * 1024 * 1024);
    assert_eq!(after.hosts[0].download_bytes, 21 * 1024 * 1024);
    assert_eq!(after.hosts[0].upload, "14.0 MB");
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_output_is_offline_not_error() {
    let transport = ScriptedTransport::new(|_, _| ScriptedReply::output("garbage"));
    let scheduler = scheduler(&transport, 1);

    let stats = scheduler.fetch_all().await;
    assert_eq!(stats.hosts[0].status, ServiceStatus::Offline);
    assert_eq!(stats.hosts[0].uptime, "N/A");
    assert!(stats.hosts[0].error.is_none());
}
