//! Fleet status command.

use std::fmt::Write as _;

use conduitdash_core::models::HostStats;
use conduitdash_core::monitoring::format_bytes;
use conduitdash_core::{FleetStats, LoadedConfig};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{format_table, print_json, with_monitor};

/// Polls every host and prints the fleet view
///
/// Unreachable hosts are shown with their error; they do not fail the command.
pub fn cmd_status(config: &LoadedConfig, format: OutputFormat) -> Result<(), CliError> {
    let stats = with_monitor(config, |monitor| async move { Ok(monitor.fetch_all().await) })?;

    match format {
        OutputFormat::Table => println!("{}", format_status(&stats)),
        OutputFormat::Json => print_json(&*stats)?,
    }
    Ok(())
}

/// Renders the fleet view followed by one line per failed host
#[must_use]
pub fn format_status(stats: &FleetStats) -> String {
    let rows: Vec<Vec<String>> = stats.hosts.iter().map(status_row).collect();
    let mut output = format_table(
        &[
            "NAME",
            "STATUS",
            "CLIENTS",
            "CONNECTING",
            "UPLOAD",
            "DOWNLOAD",
            "QUOTA",
            "UPTIME",
        ],
        &rows,
        &[2, 3, 4, 5, 6],
    );

    for host in &stats.hosts {
        if let Some(error) = &host.error {
            let _ = write!(output, "\n{}: {error}", host.name);
        }
    }
    output
}

fn status_row(host: &HostStats) -> Vec<String> {
    vec![
        host.name.clone(),
        host.status.to_string(),
        host.clients.to_string(),
        host.connecting.to_string(),
        host.upload.clone(),
        host.download.clone(),
        host.quota_bytes.map_or_else(|| "-".to_string(), format_bytes),
        host.uptime.clone(),
    ]
}
