//! Session reuse, deduplication and eviction

use std::sync::Arc;
use std::time::Duration;

use conduitdash_core::ConnectError;
use conduitdash_core::connection::{CommandExecutor, ConnectionRegistry};
use conduitdash_core::error::ExecError;
use conduitdash_core::models::Host;
use conduitdash_core::testing::{ScriptedReply, ScriptedTransport};
use conduitdash_core::transport::ConnectOptions;
use futures::future::join_all;

fn echo(host: &str, command: &str) -> ScriptedReply {
    ScriptedReply::output(format!("{host}: {command}"))
}

fn registry(transport: &ScriptedTransport, connect_timeout: Duration) -> ConnectionRegistry {
    ConnectionRegistry::new(
        Arc::new(transport.clone()),
        ConnectOptions::new("/dev/null").with_connect_timeout(connect_timeout),
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_connects_once() {
    let transport =
        ScriptedTransport::with_delays(echo, Duration::from_millis(300), Duration::ZERO);
    let registry = registry(&transport, Duration::from_secs(15));
    let host = Host::new("a", "10.0.0.1", "root");

    let sessions = join_all((0..5).map(|_| registry.acquire(&host))).await;
    let sessions: Vec<_> = sessions.into_iter().map(Result::unwrap).collect();

    assert_eq!(transport.connect_count("a"), 1);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_is_replaced() {
    let transport = ScriptedTransport::new(echo);
    let executor = CommandExecutor::new(registry(&transport, Duration::from_secs(15)));
    let host = Host::new("a", "10.0.0.1", "root");

    assert_eq!(executor.exec(&host, "uptime").await.unwrap(), "a: uptime");
    transport.drop_sessions("a");
    assert!(!executor.registry().is_connected("a"));

    assert_eq!(executor.exec(&host, "uptime").await.unwrap(), "a: uptime");
    assert_eq!(transport.connect_count("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_is_typed() {
    let transport = ScriptedTransport::with_delays(echo, Duration::from_secs(30), Duration::ZERO);
    let executor = CommandExecutor::new(registry(&transport, Duration::from_secs(2)));
    let host = Host::new("slow", "10.0.0.9", "root");

    let err = executor.exec(&host, "uptime").await.unwrap_err();
    assert_eq!(err.host(), "slow");
    assert!(matches!(
        err,
        ExecError::Connect {
            source: ConnectError::Timeout(2),
            ..
        }
    ));
    assert_eq!(executor.registry().session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_command_times_out_and_evicts() {
    let transport = ScriptedTransport::new(|_, command| {
        if command == "hang" {
            ScriptedReply::Hang
        } else {
            ScriptedReply::output("ok")
        }
    });
    let executor = CommandExecutor::new(registry(&transport, Duration::from_secs(15)))
        .with_timeout(Duration::from_secs(10));
    let host = Host::new("a", "10.0.0.1", "root");

    let err = executor.exec(&host, "hang").await.unwrap_err();
    assert!(matches!(err, ExecError::Timeout { secs: 10, .. }));
    assert!(!executor.registry().is_connected("a"));

    assert_eq!(executor.exec(&host, "next").await.unwrap(), "ok");
    assert_eq!(transport.connect_count("a"), 2);
}

#[tokio::test]
async fn test_close_all_empties_registry() {
    let transport = ScriptedTransport::new(echo);
    let registry = registry(&transport, Duration::from_secs(15));
    for name in ["a", "b", "c"] {
        registry
            .acquire(&Host::new(name, "10.0.0.1", "root"))
            .await
            .unwrap();
    }
    assert_eq!(registry.session_count(), 3);

    registry.close_all().await;
    assert_eq!(registry.session_count(), 0);
    assert!(!registry.is_connected("a"));
}
