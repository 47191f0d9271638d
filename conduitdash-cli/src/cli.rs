//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use conduitdash_core::DEFAULT_QUERY_HOURS;
use conduitdash_core::models::ControlAction;

/// Bandwidth and health monitor for a fleet of relay servers
#[derive(Parser)]
#[command(name = "conduitdash")]
#[command(author, version, about = "Relay fleet monitor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "CONDUITDASH_CONFIG_DIR")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the polling, enforcement and geo loops until interrupted
    #[command(about = "Run the monitor daemon")]
    Run,

    /// Poll every host and print its current state
    #[command(about = "Show the current state of every host")]
    Status {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Print recorded stats rows
    #[command(about = "Show recorded stats history")]
    History {
        /// Only rows of this host
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Look back this many hours
        #[arg(long, default_value_t = DEFAULT_QUERY_HOURS)]
        hours: u32,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Month-to-date usage against each quota
    #[command(about = "Show month-to-date bandwidth usage")]
    Bandwidth {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Country totals from stored geo captures
    #[command(about = "Show client countries")]
    Geo {
        /// Look back this many hours
        #[arg(long, default_value_t = DEFAULT_QUERY_HOURS)]
        hours: u32,

        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Run one geo capture on every host and store it
    #[command(about = "Capture client countries now")]
    GeoCapture {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Poll every host, then stop the ones over quota
    #[command(about = "Poll and enforce bandwidth quotas once")]
    Enforce {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Print stored counter offsets
    #[command(about = "Show stored counter offsets")]
    Offsets {
        /// Output format
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Delete every counter offset
    #[command(about = "Reset counter offsets")]
    ResetOffsets {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete all stats history and offsets
    #[command(about = "Clear stats history")]
    ClearStats {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Start, stop or restart the relay service
    #[command(about = "Control the relay service on one or all hosts")]
    Control {
        /// Action to run
        #[arg(value_enum)]
        action: ActionArg,

        /// Target host; every host when omitted
        #[arg(short = 'H', long)]
        host: Option<String>,
    },

    /// Generate shell completions
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

/// Service control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionArg {
    /// Start the service
    Start,
    /// Stop the service
    Stop,
    /// Restart the service
    Restart,
}

impl From<ActionArg> for ControlAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Start => Self::Start,
            ActionArg::Stop => Self::Stop,
            ActionArg::Restart => Self::Restart,
        }
    }
}

impl Commands {
    /// Whether this command runs the long-lived daemon
    #[must_use]
    pub const fn is_daemon(&self) -> bool {
        matches!(self, Self::Run)
    }
}
