//! One-shot poll and quota enforcement.

use conduitdash_core::LoadedConfig;
use conduitdash_core::monitoring::{EnforcementOutcome, EnforcementResult, format_bytes};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::util::{format_table, print_json, with_monitor};

/// Polls every host, stops the ones over quota and prints what happened
///
/// Fails with a remote error when a stop command could not be delivered.
pub fn cmd_enforce(config: &LoadedConfig, format: OutputFormat) -> Result<(), CliError> {
    let results = with_monitor(config, |monitor| async move {
        let (_, results) = monitor.reconcile_and_enforce().await;
        Ok(results)
    })?;

    match format {
        OutputFormat::Table if results.is_empty() => println!("No hosts have a quota."),
        OutputFormat::Table => println!("{}", format_results(&results)),
        OutputFormat::Json => print_json(&results)?,
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| matches!(r.outcome, EnforcementOutcome::StopFailed { .. }))
        .map(|r| r.host.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::Remote(format!("could not stop {}", failed.join(", "))))
    }
}

/// Renders one line per host with a quota
#[must_use]
pub fn format_results(results: &[EnforcementResult]) -> String {
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| match &r.outcome {
            EnforcementOutcome::UnderQuota { used, quota } => {
                row(&r.host, "under quota", *used, *quota, "")
            }
            EnforcementOutcome::Stopped { used, quota } => {
                row(&r.host, "stopped", *used, *quota, "")
            }
            EnforcementOutcome::StopFailed { used, quota, error } => {
                row(&r.host, "stop failed", *used, *quota, error)
            }
            EnforcementOutcome::CheckFailed { error } => vec![
                r.host.clone(),
                "check failed".to_string(),
                "-".to_string(),
                "-".to_string(),
                error.clone(),
            ],
        })
        .collect();
    format_table(&["HOST", "RESULT", "USED", "QUOTA", "ERROR"], &rows, &[2, 3])
}

fn row(host: &str, result: &str, used: u64, quota: u64, error: &str) -> Vec<String> {
    vec![
        host.to_string(),
        result.to_string(),
        format_bytes(used),
        format_bytes(quota),
        error.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduitdash_core::models::TIB;

    #[test]
    fn test_format_results() {
        let results = vec![
            EnforcementResult {
                host: "relay-1".to_string(),
                outcome: EnforcementOutcome::Stopped {
                    used: 2 * TIB,
                    quota: TIB,
                },
            },
            EnforcementResult {
                host: "relay-2".to_string(),
                outcome: EnforcementOutcome::CheckFailed {
                    error: "database is locked".to_string(),
                },
            },
        ];
        let output = format_results(&results);
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[2].contains("stopped"));
        assert!(lines[2].contains(&format_bytes(2 * TIB)));
        assert!(lines[3].contains("check failed"));
        assert!(lines[3].ends_with("database is locked"));
    }
}
