//! Shared utility functions used across command modules.

use std::future::Future;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use conduitdash_core::config::ConfigManager;
use conduitdash_core::{AppSettings, LoadedConfig, Monitor};
use serde::Serialize;

use crate::error::CliError;

/// Creates a `ConfigManager` using the optional custom config directory
/// from CLI args.
pub fn create_config_manager(config_path: Option<&Path>) -> Result<ConfigManager, CliError> {
    match config_path {
        Some(path) => Ok(ConfigManager::with_config_dir(path.to_path_buf())),
        None => ConfigManager::new()
            .map_err(|e| CliError::Config(format!("Failed to initialize config: {e}"))),
    }
}

/// Loads the host list on top of already-read settings
pub fn load_config(
    manager: &ConfigManager,
    settings: AppSettings,
) -> Result<LoadedConfig, CliError> {
    let hosts = manager.load_hosts(&settings)?;
    Ok(LoadedConfig {
        settings,
        hosts,
        config_dir: manager.config_dir().to_path_buf(),
    })
}

/// Creates the multi-threaded runtime commands block on
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Runtime(format!("Failed to create async runtime: {e}")))
}

/// Opens the monitor, runs `body` against it and closes every session
///
/// Sessions are closed whether or not `body` succeeds.
pub fn with_monitor<T, F, Fut>(config: &LoadedConfig, body: F) -> Result<T, CliError>
where
    F: FnOnce(Arc<Monitor>) -> Fut,
    Fut: Future<Output = Result<T, CliError>>,
{
    runtime()?.block_on(async {
        let monitor = Arc::new(Monitor::open(config).await?);
        let result = body(Arc::clone(&monitor)).await;
        monitor.shutdown().await;
        result
    })
}

/// Prints `value` as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Output(format!("Failed to serialize to JSON: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Asks a yes/no question on stderr, defaulting to no
pub fn confirm(prompt: &str) -> Result<bool, CliError> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt} [y/N] ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Renders rows as space-aligned columns under a dashed header
///
/// Columns listed in `right` are right-aligned.
#[must_use]
pub fn format_table(headers: &[&str], rows: &[Vec<String>], right: &[usize]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(render_row(headers.iter().copied(), &widths, right));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        lines.push(render_row(row.iter().map(String::as_str), &widths, right));
    }
    lines.join("\n")
}

fn render_row<'a>(
    cells: impl Iterator<Item = &'a str>,
    widths: &[usize],
    right: &[usize],
) -> String {
    let line = cells
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, &width))| {
            if right.contains(&i) {
                format!("{cell:>width$}")
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}
