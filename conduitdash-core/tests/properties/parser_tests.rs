//! Property-based tests for the status parser

use conduitdash_core::models::ServiceStatus;
use conduitdash_core::monitoring::parse_status;
use proptest::prelude::*;

// ========== Strategies ==========

/// Journal noise that never looks like a metrics line
fn arb_noise() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9 :=-]{0,40}", 0..5).prop_map(|lines| lines.join("\n"))
}

fn arb_quantity() -> impl Strategy<Value = String> {
    (0u32..1024, 0u32..10, prop::sample::select(vec!["B", "KB", "MB", "GB", "TB"]))
        .prop_map(|(whole, tenth, unit)| format!("{whole}.{tenth} {unit}"))
}

#[derive(Debug, Clone)]
struct NewLine {
    connecting: u32,
    connected: u32,
    up: String,
    down: String,
}

impl NewLine {
    fn render(&self) -> String {
        format!(
            "[STATS] Connecting: {} | Connected: {} | Up: {} | Down: {} | Uptime: 1h2m",
            self.connecting, self.connected, self.up, self.down
        )
    }
}

fn arb_new_line() -> impl Strategy<Value = NewLine> {
    (0u32..10_000, 0u32..10_000, arb_quantity(), arb_quantity()).prop_map(
        |(connecting, connected, up, down)| NewLine {
            connecting,
            connected,
            up,
            down,
        },
    )
}

fn old_line(clients: u32) -> String {
    format!("[STATS] Clients: {clients} | Up: 9.9 GB | Down: 9.9 GB | Uptime: 9h")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_parse_never_panics(output in ".{0,300}") {
        let snapshot = parse_status(&output, "host");
        prop_assert_eq!(snapshot.host, "host");
        prop_assert!(snapshot.error.is_none());
    }

    /// The last metrics line of the newer format wins, whatever precedes it
    #[test]
    fn prop_last_new_format_line_wins(
        lines in prop::collection::vec(arb_new_line(), 1..6),
        noise in arb_noise(),
        old_clients in 0u32..100,
    ) {
        let mut output = format!("Active: active (running)\n{noise}\n");
        for (i, line) in lines.iter().enumerate() {
            output.push_str(&line.render());
            output.push('\n');
            if i == 0 {
                // an old-format line after a new-format one must not win
                output.push_str(&old_line(old_clients));
                output.push('\n');
            }
        }

        let last = lines.last().unwrap();
        let snapshot = parse_status(&output, "h");
        prop_assert_eq!(snapshot.status, ServiceStatus::Running);
        prop_assert_eq!(snapshot.connecting, last.connecting);
        prop_assert_eq!(snapshot.clients, last.connected);
        prop_assert_eq!(&snapshot.upload, &last.up);
        prop_assert_eq!(&snapshot.download, &last.down);
        prop_assert_eq!(snapshot.uptime, "1h2m");
    }

    #[test]
    fn prop_old_format_used_alone(clients in prop::collection::vec(0u32..10_000, 1..5)) {
        let output: String = clients.iter().map(|c| old_line(*c) + "\n").collect();
        let snapshot = parse_status(&output, "h");
        prop_assert_eq!(snapshot.clients, *clients.last().unwrap());
        prop_assert_eq!(snapshot.connecting, 0);
        prop_assert_eq!(snapshot.upload, "9.9 GB");
    }

    #[test]
    fn prop_noise_only_is_offline_with_zero_metrics(noise in arb_noise()) {
        let snapshot = parse_status(&noise, "h");
        prop_assert_eq!(snapshot.clients, 0);
        prop_assert_eq!(snapshot.upload, "0 B");
        prop_assert_eq!(snapshot.uptime, "N/A");
    }
}

#[test]
fn test_connected_marker_overrides_running() {
    let output = "Active: active (running)\n[OK] Connected to Psiphon network\n";
    assert_eq!(parse_status(output, "h").status, ServiceStatus::Connected);
}

#[test]
fn test_inactive_is_stopped() {
    let output = "Active: inactive (dead) since Tue\n";
    assert_eq!(parse_status(output, "h").status, ServiceStatus::Stopped);
}
