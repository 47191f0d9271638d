//! Stats history command.

use chrono::Local;
use conduitdash_core::monitoring::format_bytes;
use conduitdash_core::{LoadedConfig, StatsRow};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{format_table, print_json, with_monitor};

/// Prints stats rows of the last `hours` hours, oldest first
pub fn cmd_history(
    config: &LoadedConfig,
    host: Option<String>,
    hours: u32,
    format: OutputFormat,
) -> Result<(), CliError> {
    let rows = with_monitor(config, |monitor| async move {
        Ok(monitor.history(host.as_deref(), hours).await?)
    })?;

    match format {
        OutputFormat::Table if rows.is_empty() => {
            println!("No stats recorded in the last {hours} hours.");
        }
        OutputFormat::Table => println!("{}", format_history(&rows)),
        OutputFormat::Json => print_json(&rows)?,
    }
    Ok(())
}

/// Renders history rows with local timestamps
#[must_use]
pub fn format_history(rows: &[StatsRow]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                row.host.clone(),
                row.status.to_string(),
                row.clients.to_string(),
                format_bytes(row.upload_bytes),
                format_bytes(row.download_bytes),
                row.uptime.clone(),
            ]
        })
        .collect();
    format_table(
        &[
            "TIME", "HOST", "STATUS", "CLIENTS", "UPLOAD", "DOWNLOAD", "UPTIME",
        ],
        &cells,
        &[3, 4, 5],
    )
}
