//! Geo capture across the fleet

use chrono::{TimeDelta, Utc};
use conduitdash_core::models::GEO_AGGREGATE_HOST;
use conduitdash_core::monitoring::{GEO_COMMAND, GeoPipeline};
use conduitdash_core::testing::{ScriptedReply, ScriptedTransport};

use super::{executor, fleet, memory_store};

fn tally(host: &str, _command: &str) -> ScriptedReply {
    match host {
        "h0" => ScriptedReply::output(
            "     40 IR, Iran, Islamic Republic of\n      3 DE, Germany\n",
        ),
        "h1" => ScriptedReply::output(
            "      2 IR, Iran, Islamic Republic of\n      9 RU, Russian Federation\n",
        ),
        _ => ScriptedReply::channel_error("tcpdump: permission denied"),
    }
}

#[tokio::test]
async fn test_capture_aggregates_and_degrades() {
    let transport = ScriptedTransport::new(tally);
    let (memory, store) = memory_store();
    let pipeline = GeoPipeline::new(executor(&transport), store);

    let capture = pipeline.capture(&fleet(3)).await;

    assert_eq!(capture.hosts.len(), 3);
    assert_eq!(capture.responding_hosts(), 2);
    assert!(capture.hosts[2].countries.is_empty());
    assert!(capture.hosts[2].error.is_some());

    let totals: Vec<(&str, &str, u64)> = capture
        .totals
        .iter()
        .map(|c| (c.code.as_str(), c.country.as_str(), c.count))
        .collect();
    assert_eq!(
        totals,
        [("IR", "Iran", 42), ("RU", "Russia", 9), ("DE", "Germany", 3)]
    );

    let rows = memory.geo_rows().await;
    assert_eq!(rows.len(), 4 + 3);
    assert_eq!(
        rows.iter().filter(|r| r.host == GEO_AGGREGATE_HOST).count(),
        3
    );
    assert_eq!(transport.calls_matching("geoiplookup").len(), 3);
    assert!(transport.calls().iter().all(|c| c.command == GEO_COMMAND));
}

#[tokio::test]
async fn test_query_does_not_double_count_aggregate() {
    let transport = ScriptedTransport::new(tally);
    let (_, store) = memory_store();
    let pipeline = GeoPipeline::new(executor(&transport), store);

    pipeline.capture(&fleet(2)).await;
    pipeline.capture(&fleet(2)).await;

    let summed = pipeline
        .query(Utc::now() - TimeDelta::hours(1))
        .await
        .unwrap();
    assert_eq!(summed[0].code, "IR");
    assert_eq!(summed[0].count, 84);
    assert_eq!(summed.len(), 3);

    let none = pipeline
        .query(Utc::now() + TimeDelta::hours(1))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_custom_command() {
    let transport = ScriptedTransport::new(|_, command| {
        if command == "cat /tmp/geo" {
            ScriptedReply::output("5 US, United States")
        } else {
            ScriptedReply::output("")
        }
    });
    let (_, store) = memory_store();
    let pipeline = GeoPipeline::new(executor(&transport), store).with_command("cat /tmp/geo");

    let capture = pipeline.capture(&fleet(1)).await;
    assert_eq!(capture.totals[0].count, 5);
}
