//! Parser for the relay service status output
//!
//! The input is whatever `systemctl status` and the tail of the service
//! journal printed, concatenated. Nothing here is validated: unknown text
//! degrades to an offline snapshot with zeroed metrics.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{ServiceStatus, Snapshot};

/// Metrics line printed by current service versions
static STATS_CONNECTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[STATS\]\s*Connecting:\s*(\d+)\s*\|\s*Connected:\s*(\d+)\s*\|\s*Up:\s*([^|]+)\|\s*Down:\s*([^|]+)\|\s*Uptime:\s*(\S+)",
    )
    .expect("valid regex")
});

/// Metrics line printed by older service versions
static STATS_CLIENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[STATS\]\s*Clients:\s*(\d+)\s*\|\s*Up:\s*([^|]+)\|\s*Down:\s*([^|]+)\|\s*Uptime:\s*(\S+)",
    )
    .expect("valid regex")
});

/// One status classification rule: a substring marker mapped to a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    /// Substring to look for (case-sensitive)
    pub marker: String,
    /// State assigned when the marker is present
    pub status: ServiceStatus,
    /// Override rules are checked after the base classification and win
    /// over it; base rules are checked in order and the first match wins
    #[serde(default, rename = "override")]
    pub overrides: bool,
}

impl StatusRule {
    /// Creates a base rule
    #[must_use]
    pub fn base(marker: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            marker: marker.into(),
            status,
            overrides: false,
        }
    }

    /// Creates an override rule
    #[must_use]
    pub fn overriding(marker: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            marker: marker.into(),
            status,
            overrides: true,
        }
    }
}

/// Ordered status classification rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRules {
    rules: Vec<StatusRule>,
}

impl Default for StatusRules {
    fn default() -> Self {
        Self {
            rules: vec![
                StatusRule::base("Active: active", ServiceStatus::Running),
                StatusRule::base("running", ServiceStatus::Running),
                StatusRule::base("Active: inactive", ServiceStatus::Stopped),
                StatusRule::base("dead", ServiceStatus::Stopped),
                StatusRule::overriding(
                    "[OK] Connected to Psiphon network",
                    ServiceStatus::Connected,
                ),
            ],
        }
    }
}

impl StatusRules {
    /// Appends extra rules after the built-in ones
    #[must_use]
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = StatusRule>) -> Self {
        self.rules.extend(extra);
        self
    }

    /// Returns the rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[StatusRule] {
        &self.rules
    }

    /// Classifies raw output
    ///
    /// The first matching base rule decides the state, `Offline` if none
    /// match. Every matching override rule is then applied in order.
    #[must_use]
    pub fn classify(&self, output: &str) -> ServiceStatus {
        let mut status = self
            .rules
            .iter()
            .filter(|r| !r.overrides)
            .find(|r| output.contains(&r.marker))
            .map_or(ServiceStatus::Offline, |r| r.status);

        for rule in self.rules.iter().filter(|r| r.overrides) {
            if output.contains(&rule.marker) {
                status = rule.status;
            }
        }
        status
    }
}

/// Stateless status parser holding its classification rules
#[derive(Debug, Clone, Default)]
pub struct StatusParser {
    rules: StatusRules,
}

impl StatusParser {
    /// Creates a parser with the given rules
    #[must_use]
    pub const fn new(rules: StatusRules) -> Self {
        Self { rules }
    }

    /// Parses combined status output into a snapshot; never fails
    ///
    /// The last metrics line in the output wins. When both line formats are
    /// present the newer format is used.
    #[must_use]
    pub fn parse(&self, output: &str, host: &str) -> Snapshot {
        let mut snapshot = Snapshot::empty(host);
        snapshot.status = self.rules.classify(output);

        if let Some(caps) = STATS_CONNECTING_RE.captures_iter(output).last() {
            snapshot.connecting = parse_count(&caps[1]);
            snapshot.clients = parse_count(&caps[2]);
            snapshot.upload = caps[3].trim().to_string();
            snapshot.download = caps[4].trim().to_string();
            snapshot.uptime = caps[5].trim().to_string();
        } else if let Some(caps) = STATS_CLIENTS_RE.captures_iter(output).last() {
            snapshot.clients = parse_count(&caps[1]);
            snapshot.upload = caps[2].trim().to_string();
            snapshot.download = caps[3].trim().to_string();
            snapshot.uptime = caps[4].trim().to_string();
        }

        snapshot
    }
}

/// Parses combined status output with the built-in rules
#[must_use]
pub fn parse_status(output: &str, host: &str) -> Snapshot {
    StatusParser::default().parse(output, host)
}

fn parse_count(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}
