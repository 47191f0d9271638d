//! Counter offset and history maintenance commands.

use std::collections::BTreeMap;

use conduitdash_core::monitoring::format_bytes;
use conduitdash_core::{LoadedConfig, OffsetRecord};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{confirm, format_table, print_json, with_monitor};

/// Prints every stored offset record
pub fn cmd_offsets(config: &LoadedConfig, format: OutputFormat) -> Result<(), CliError> {
    let offsets = with_monitor(config, |monitor| async move { Ok(monitor.offsets().await?) })?;

    match format {
        OutputFormat::Table if offsets.is_empty() => println!("No offsets stored."),
        OutputFormat::Table => println!("{}", format_offsets(&offsets)),
        OutputFormat::Json => {
            let by_host: BTreeMap<&str, &OffsetRecord> =
                offsets.iter().map(|(host, record)| (host.as_str(), record)).collect();
            print_json(&by_host)?;
        }
    }
    Ok(())
}

/// Deletes every offset record after confirmation
pub fn cmd_reset_offsets(config: &LoadedConfig, yes: bool) -> Result<(), CliError> {
    if !yes && !confirm("Reset all counter offsets? Totals restart from the live counters.")? {
        println!("Aborted.");
        return Ok(());
    }
    let removed =
        with_monitor(config, |monitor| async move { Ok(monitor.reset_offsets().await?) })?;
    println!("Removed {removed} offset record(s).");
    Ok(())
}

/// Deletes all stats history and offsets after confirmation
pub fn cmd_clear_stats(config: &LoadedConfig, yes: bool) -> Result<(), CliError> {
    if !yes && !confirm("Delete all stats history and offsets?")? {
        println!("Aborted.");
        return Ok(());
    }
    let cleared =
        with_monitor(config, |monitor| async move { Ok(monitor.clear_stats().await?) })?;
    println!(
        "Removed {} stats row(s) and {} offset record(s).",
        cleared.stats, cleared.offsets
    );
    Ok(())
}

/// Renders offsets with the cumulative totals they produce
#[must_use]
pub fn format_offsets(offsets: &[(String, OffsetRecord)]) -> String {
    let rows: Vec<Vec<String>> = offsets
        .iter()
        .map(|(host, record)| {
            vec![
                host.clone(),
                format_bytes(record.upload_offset),
                format_bytes(record.download_offset),
                format_bytes(record.last_upload),
                format_bytes(record.last_download),
                format_bytes(record.cumulative_upload()),
                format_bytes(record.cumulative_download()),
            ]
        })
        .collect();
    format_table(
        &[
            "HOST",
            "UP OFFSET",
            "DOWN OFFSET",
            "LAST UP",
            "LAST DOWN",
            "TOTAL UP",
            "TOTAL DOWN",
        ],
        &rows,
        &[1, 2, 3, 4, 5, 6],
    )
}
