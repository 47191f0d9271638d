//! Service control command.

use conduitdash_core::{ControlAction, ControlResult, LoadedConfig};

use crate::error::CliError;
use crate::util::{format_table, with_monitor};

/// Runs `action` on one host, or on every host when `host` is `None`
pub fn cmd_control(
    config: &LoadedConfig,
    action: ControlAction,
    host: Option<String>,
) -> Result<(), CliError> {
    match host {
        Some(name) => {
            let output = with_monitor(config, |monitor| {
                let name = name.clone();
                async move { Ok(monitor.control_host(&name, action).await?) }
            })?;
            let output = output.trim();
            if !output.is_empty() {
                println!("{output}");
            }
            println!("Sent {action} to {name}.");
            Ok(())
        }
        None => {
            let results = with_monitor(config, |monitor| async move {
                Ok(monitor.control_all(action).await)
            })?;
            println!("{}", format_control(&results));

            let failed = results.iter().filter(|r| !r.success).count();
            if failed == 0 {
                Ok(())
            } else {
                Err(CliError::Remote(format!(
                    "{action} failed on {failed} of {} hosts",
                    results.len()
                )))
            }
        }
    }
}

/// Renders per-host control results
#[must_use]
pub fn format_control(results: &[ControlResult]) -> String {
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            vec![
                r.host.clone(),
                if r.success { "ok" } else { "failed" }.to_string(),
                r.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    format_table(&["HOST", "RESULT", "ERROR"], &rows, &[])
}
