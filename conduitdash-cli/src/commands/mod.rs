//! Command handler modules for the CLI.

mod bandwidth;
mod completions;
mod control;
mod enforce;
mod geo;
mod history;
mod offsets;
mod run;
mod status;

pub use completions::cmd_completions;

use conduitdash_core::LoadedConfig;

use crate::cli::Commands;
use crate::error::CliError;

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(config: &LoadedConfig, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run => run::cmd_run(config),
        Commands::Status { format } => status::cmd_status(config, format),
        Commands::History {
            host,
            hours,
            format,
        } => history::cmd_history(config, host, hours, format),
        Commands::Bandwidth { format } => bandwidth::cmd_bandwidth(config, format),
        Commands::Geo { hours, format } => geo::cmd_geo(config, hours, format),
        Commands::GeoCapture { format } => geo::cmd_geo_capture(config, format),
        Commands::Enforce { format } => enforce::cmd_enforce(config, format),
        Commands::Offsets { format } => offsets::cmd_offsets(config, format),
        Commands::ResetOffsets { yes } => offsets::cmd_reset_offsets(config, yes),
        Commands::ClearStats { yes } => offsets::cmd_clear_stats(config, yes),
        Commands::Control { action, host } => control::cmd_control(config, action.into(), host),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}
