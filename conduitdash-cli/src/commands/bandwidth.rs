//! Month-to-date bandwidth report.

use conduitdash_core::monitoring::format_bytes;
use conduitdash_core::{BandwidthUsage, LoadedConfig};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{format_table, print_json, with_monitor};

/// Prints month-to-date usage of every host
pub fn cmd_bandwidth(config: &LoadedConfig, format: OutputFormat) -> Result<(), CliError> {
    let usage = with_monitor(config, |monitor| async move { Ok(monitor.bandwidth().await?) })?;

    match format {
        OutputFormat::Table => println!("{}", format_bandwidth(&usage)),
        OutputFormat::Json => print_json(&usage)?,
    }
    Ok(())
}

/// Renders usage rows; hosts without a quota show `-`
#[must_use]
pub fn format_bandwidth(usage: &[BandwidthUsage]) -> String {
    let rows: Vec<Vec<String>> = usage
        .iter()
        .map(|u| {
            let (quota, percent) = match u.quota_bytes {
                Some(quota) => (format_bytes(quota), format!("{:.2}%", u.percent)),
                None => ("-".to_string(), "-".to_string()),
            };
            vec![
                u.name.clone(),
                format_bytes(u.upload_bytes),
                format_bytes(u.download_bytes),
                quota,
                percent,
            ]
        })
        .collect();
    format_table(
        &["NAME", "UPLOAD", "DOWNLOAD", "QUOTA", "USED"],
        &rows,
        &[1, 2, 3, 4],
    )
}
