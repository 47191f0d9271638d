//! Client country commands.

use std::fmt::Write as _;

use chrono::Local;
use conduitdash_core::monitoring::GeoCapture;
use conduitdash_core::{GeoCount, LoadedConfig};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{format_table, print_json, with_monitor};

/// Prints country totals of the last `hours` hours
pub fn cmd_geo(config: &LoadedConfig, hours: u32, format: OutputFormat) -> Result<(), CliError> {
    let counts =
        with_monitor(config, |monitor| async move { Ok(monitor.fetch_geo(hours).await?) })?;

    match format {
        OutputFormat::Table if counts.is_empty() => {
            println!("No geo data in the last {hours} hours.");
        }
        OutputFormat::Table => println!("{}", format_counts(&counts)),
        OutputFormat::Json => print_json(&counts)?,
    }
    Ok(())
}

/// Captures countries on every host now and prints the result
pub fn cmd_geo_capture(config: &LoadedConfig, format: OutputFormat) -> Result<(), CliError> {
    let capture = with_monitor(config, |monitor| async move { Ok(monitor.capture_geo().await) })?;

    match format {
        OutputFormat::Table => println!("{}", format_capture(&capture)),
        OutputFormat::Json => print_json(&capture)?,
    }
    Ok(())
}

/// Renders country totals, largest first
#[must_use]
pub fn format_counts(counts: &[GeoCount]) -> String {
    let rows: Vec<Vec<String>> = counts
        .iter()
        .map(|c| vec![c.code.clone(), c.country.clone(), c.count.to_string()])
        .collect();
    format_table(&["CODE", "COUNTRY", "CLIENTS"], &rows, &[2])
}

/// Renders a capture summary, its totals and per-host failures
#[must_use]
pub fn format_capture(capture: &GeoCapture) -> String {
    let mut output = format!(
        "Captured at {} from {}/{} hosts\n\n",
        capture
            .captured_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        capture.responding_hosts(),
        capture.hosts.len()
    );
    if capture.totals.is_empty() {
        output.push_str("No clients seen.");
    } else {
        output.push_str(&format_counts(&capture.totals));
    }
    for host in &capture.hosts {
        if let Some(error) = &host.error {
            let _ = write!(output, "\n{}: {error}", host.host);
        }
    }
    output
}
