//! `conduitdash` - bandwidth and health monitor for a fleet of relay servers
//!
//! Runs the polling daemon and exposes one-shot commands for status,
//! history, bandwidth usage, client countries, counter offsets and
//! service control.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::{Cli, Commands};
use conduitdash_core::config::LoggingSettings;
use conduitdash_core::tracing::{TracingConfig, TracingLevel, init_tracing};

use crate::error::CliError;
use crate::util::{create_config_manager, load_config};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Completions { shell } = cli.command {
        return commands::cmd_completions(shell);
    }

    let manager = create_config_manager(cli.config.as_deref())?;
    let settings = manager.load_settings();
    let logging = settings
        .as_ref()
        .map(|s| s.logging.clone())
        .unwrap_or_default();
    init_logging(&logging, &cli);

    let config = load_config(&manager, settings?)?;
    commands::dispatch(&config, cli.command)
}

/// Installs the subscriber from `[logging]` and the verbosity flags
///
/// The daemon logs at `info` by default, one-shot commands at `warn` so
/// their output stays readable. An explicit `[logging] level` replaces
/// either default.
fn init_logging(logging: &LoggingSettings, cli: &Cli) {
    let mut config = TracingConfig::from_settings(logging);
    if logging.level.is_none() && !cli.command.is_daemon() {
        config.level = TracingLevel::Warn;
    }
    for _ in 0..cli.verbose {
        config.level = config.level.more_verbose();
    }
    if cli.quiet {
        config.level = TracingLevel::Error;
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }
}
