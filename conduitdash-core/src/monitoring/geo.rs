//! Country breakdown of relay peers
//!
//! Every host samples inbound packets for a short while, resolves the
//! distinct peer addresses with `geoiplookup` and prints a tally per country.
//! All hosts are sampled at once. A host that fails contributes nothing; the
//! capture as a whole always succeeds.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::connection::CommandExecutor;
use crate::error::StoreResult;
use crate::models::{GEO_AGGREGATE_HOST, GeoCount, GeoRow, Host};
use crate::storage::{StatsStore, sort_geo_counts};

/// Default capture: 30 s of inbound packets, unique peers, country tally
pub const GEO_COMMAND: &str = "timeout 30 tcpdump -ni any 'inbound and (tcp or udp)' -c 500 2>/dev/null \
| awk '{print $5}' | cut -d. -f1-4 | grep -E '^[0-9]+\\.' | sort -u \
| xargs -n1 geoiplookup 2>/dev/null | grep -v 'not found' \
| awk -F': ' '{print $2}' | sort | uniq -c | sort -rn";

/// `<count> <alpha-2>, <country name>`
static GEO_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+([A-Z]{2}),\s*(.+)$").expect("valid regex"));

/// GeoIP database names mapped to the short names shown to users
const COUNTRY_SYNONYMS: &[(&str, &str)] = &[
    ("Iran, Islamic Republic of", "Iran"),
    ("Korea, Republic of", "South Korea"),
    ("Korea, Democratic People's Republic of", "North Korea"),
    ("Russian Federation", "Russia"),
    ("United Kingdom", "UK"),
    ("United Arab Emirates", "UAE"),
    ("Viet Nam", "Vietnam"),
    ("Taiwan, Province of China", "Taiwan"),
    ("Hong Kong", "Hong Kong"),
    ("Syrian Arab Republic", "Syria"),
    ("Venezuela, Bolivarian Republic of", "Venezuela"),
    ("Tanzania, United Republic of", "Tanzania"),
    ("Moldova, Republic of", "Moldova"),
    ("Macedonia, the Former Yugoslav Republic of", "Macedonia"),
    ("Lao People's Democratic Republic", "Laos"),
    ("Libyan Arab Jamahiriya", "Libya"),
    ("Palestinian Territory, Occupied", "Palestine"),
    ("Congo, The Democratic Republic of the", "DR Congo"),
];

/// Maps a GeoIP country name to its short form; unknown names pass through
#[must_use]
pub fn normalize_country(name: &str) -> String {
    let name = name.trim();
    COUNTRY_SYNONYMS
        .iter()
        .find(|(long, _)| *long == name)
        .map_or_else(|| name.to_string(), |(_, short)| (*short).to_string())
}

/// Parses tally lines, merging repeated country codes; other lines are ignored
#[must_use]
pub fn parse_geo_output(output: &str) -> Vec<GeoCount> {
    let mut counts: Vec<GeoCount> = Vec::new();
    for line in output.lines() {
        let Some(caps) = GEO_LINE_RE.captures(line.trim()) else {
            continue;
        };
        let Ok(count) = caps[1].parse::<u64>() else {
            continue;
        };
        let code = &caps[2];
        match counts.iter_mut().find(|c| c.code == code) {
            Some(existing) => existing.count = existing.count.saturating_add(count),
            None => counts.push(GeoCount {
                code: code.to_string(),
                country: normalize_country(&caps[3]),
                count,
            }),
        }
    }
    counts
}

/// Sums per-host tallies by country code, largest first
#[must_use]
pub fn aggregate_counts<'a>(tallies: impl IntoIterator<Item = &'a [GeoCount]>) -> Vec<GeoCount> {
    let mut totals: HashMap<&str, GeoCount> = HashMap::new();
    for tally in tallies {
        for count in tally {
            totals
                .entry(count.code.as_str())
                .and_modify(|t| t.count = t.count.saturating_add(count.count))
                .or_insert_with(|| count.clone());
        }
    }
    let mut totals: Vec<GeoCount> = totals.into_values().collect();
    sort_geo_counts(&mut totals);
    totals
}

/// Capture result of one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostGeo {
    /// Host name
    pub host: String,
    /// Country tallies, empty on failure
    pub countries: Vec<GeoCount>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one fleet-wide capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoCapture {
    /// When the capture started
    pub captured_at: DateTime<Utc>,
    /// Per-host results in host order
    pub hosts: Vec<HostGeo>,
    /// Cross-host totals, largest first
    pub totals: Vec<GeoCount>,
}

impl GeoCapture {
    /// Number of hosts that reported at least one country
    #[must_use]
    pub fn responding_hosts(&self) -> usize {
        self.hosts.iter().filter(|h| !h.countries.is_empty()).count()
    }

    /// Rows to persist: per-host tallies followed by the aggregate
    #[must_use]
    pub fn rows(&self) -> Vec<GeoRow> {
        let per_host = self.hosts.iter().flat_map(|h| {
            h.countries
                .iter()
                .map(|c| self.row(&h.host, c))
        });
        let aggregate = self
            .totals
            .iter()
            .map(|c| self.row(GEO_AGGREGATE_HOST, c));
        per_host.chain(aggregate).collect()
    }

    fn row(&self, host: &str, count: &GeoCount) -> GeoRow {
        GeoRow {
            timestamp: self.captured_at,
            host: host.to_string(),
            country_code: count.code.clone(),
            country_name: count.country.clone(),
            count: count.count,
        }
    }
}

/// Runs geo captures and stores their results
#[derive(Clone)]
pub struct GeoPipeline {
    executor: CommandExecutor,
    store: Arc<dyn StatsStore>,
    command: String,
}

impl GeoPipeline {
    /// Creates a pipeline running [`GEO_COMMAND`]
    #[must_use]
    pub fn new(executor: CommandExecutor, store: Arc<dyn StatsStore>) -> Self {
        Self {
            executor,
            store,
            command: GEO_COMMAND.to_string(),
        }
    }

    /// Uses a different capture command
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Captures every host at once, then appends per-host and aggregate rows
    ///
    /// A storage failure is logged; the capture is returned regardless.
    #[instrument(name = "geo.capture", skip(self, hosts), fields(hosts = hosts.len()))]
    pub async fn capture(&self, hosts: &[Host]) -> GeoCapture {
        let captured_at = Utc::now();
        let results = join_all(hosts.iter().map(|host| self.capture_host(host))).await;
        let totals = aggregate_counts(results.iter().map(|h| h.countries.as_slice()));
        let capture = GeoCapture {
            captured_at,
            hosts: results,
            totals,
        };

        if let Err(e) = self.store.append_geo_rows(&capture.rows()).await {
            warn!(error = %e, "Failed to store geo capture");
        }
        info!(
            countries = capture.totals.len(),
            responding = capture.responding_hosts(),
            hosts = hosts.len(),
            "Geo capture complete"
        );
        capture
    }

    async fn capture_host(&self, host: &Host) -> HostGeo {
        match self.executor.exec(host, &self.command).await {
            Ok(output) => HostGeo {
                host: host.name.clone(),
                countries: parse_geo_output(&output),
                error: None,
            },
            Err(e) => {
                warn!(host = %host.name, error = %e, "Geo capture failed");
                HostGeo {
                    host: host.name.clone(),
                    countries: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Country totals of all captures at or after `since`
    pub async fn query(&self, since: DateTime<Utc>) -> StoreResult<Vec<GeoCount>> {
        self.store.sum_geo_by_country(since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_normalize() {
        let output = "    176 IR, Iran, Islamic Republic of\n     12 DE, Germany\n      3 GB, United Kingdom\n";
        let counts = parse_geo_output(output);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[0].code, "IR");
        assert_eq!(counts[0].country, "Iran");
        assert_eq!(counts[0].count, 176);
        assert_eq!(counts[2].country, "UK");
    }

    #[test]
    fn test_parse_skips_noise() {
        let output = "tcpdump: verbose output suppressed\n 5 xx, lowercase\n\n 2 US, United States\n";
        let counts = parse_geo_output(output);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].country, "United States");
    }

    #[test]
    fn test_parse_merges_repeated_codes() {
        let counts = parse_geo_output(" 2 KR, Korea, Republic of\n 3 KR, South Korea\n");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].count, 5);
        assert_eq!(counts[0].country, "South Korea");
    }

    #[test]
    fn test_normalize_unknown_passes_through() {
        assert_eq!(normalize_country("  Narnia "), "Narnia");
        assert_eq!(
            normalize_country("Congo, The Democratic Republic of the"),
            "DR Congo"
        );
    }

    #[test]
    fn test_aggregate() {
        let a = parse_geo_output(" 2 DE, Germany\n 1 IR, Iran, Islamic Republic of\n");
        let b = parse_geo_output(" 5 IR, Iran, Islamic Republic of\n");
        let totals = aggregate_counts([a.as_slice(), b.as_slice()]);
        assert_eq!(totals[0].code, "IR");
        assert_eq!(totals[0].count, 6);
        assert_eq!(totals[1].count, 2);
    }

    #[test]
    fn test_capture_rows_include_aggregate() {
        let capture = GeoCapture {
            captured_at: Utc::now(),
            hosts: vec![HostGeo {
                host: "a".to_string(),
                countries: parse_geo_output(" 2 DE, Germany\n"),
                error: None,
            }],
            totals: parse_geo_output(" 2 DE, Germany\n"),
        };
        let rows = capture.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].host, "a");
        assert_eq!(rows[1].host, GEO_AGGREGATE_HOST);
    }
}
