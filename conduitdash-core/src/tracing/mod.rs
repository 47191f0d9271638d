//! Tracing integration for structured logging
//!
//! Installs a `tracing-subscriber` formatter driven by an [`EnvFilter`].
//! Poll cycles, geo captures and quota checks each run inside a named span
//! (`poll.cycle`, `geo.capture`, `enforce.check`).

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingSettings;

/// Set by the first [`init_tracing`] call
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Subscriber setup failures
#[derive(Debug, Error)]
pub enum TracingError {
    /// The filter was rejected or a subscriber is already installed
    #[error("Failed to initialize tracing: {0}")]
    InitializationFailed(String),

    /// [`init_tracing`] ran before
    #[error("Tracing has already been initialized")]
    AlreadyInitialized,

    /// The log file or its directory could not be created
    #[error("Failed to create log file: {0}")]
    FileCreationFailed(String),
}

/// Result alias for [`init_tracing`]
pub type TracingResult<T> = Result<T, TracingError>;

/// Verbosity applied to the conduitdash crates when no filter is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TracingLevel {
    /// Failures only
    Error,
    /// Per-host failures and degraded results
    Warn,
    /// Resets, auto-stops and capture summaries
    #[default]
    Info,
    /// Connects, evictions and cache hits
    Debug,
    /// Everything
    Trace,
}

impl TracingLevel {
    const ALL: [Self; 5] = [Self::Error, Self::Warn, Self::Info, Self::Debug, Self::Trace];

    /// Directive name used in filter strings
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// One step more verbose, saturating at `Trace`
    #[must_use]
    pub const fn more_verbose(self) -> Self {
        match self {
            Self::Error => Self::Warn,
            Self::Warn => Self::Info,
            Self::Info => Self::Debug,
            Self::Debug | Self::Trace => Self::Trace,
        }
    }
}

impl FromStr for TracingLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("warning") {
            return Ok(Self::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|level| s.eq_ignore_ascii_case(level.as_str()))
            .ok_or(())
    }
}

impl fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Standard output
    Stdout,
    /// Standard error, keeping stdout free for command output
    #[default]
    Stderr,
    /// A file, truncated on start; ANSI colors are disabled
    File(PathBuf),
}

/// Subscriber settings
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Level for the conduitdash crates
    pub level: TracingLevel,
    /// Destination
    pub output: TracingOutput,
    /// Full `EnvFilter` directive; replaces `level` when set
    pub filter: Option<String>,
}

impl TracingConfig {
    /// Info level on stderr
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the `[logging]` section
    ///
    /// Unknown level names fall back to `info`. `RUST_LOG`, when set, takes
    /// precedence over both the level and the configured filter.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let level = settings
            .level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or_default();
        let output = settings
            .file
            .clone()
            .map_or(TracingOutput::Stderr, TracingOutput::File);
        let filter = std::env::var("RUST_LOG")
            .ok()
            .filter(|f| !f.trim().is_empty())
            .or_else(|| settings.filter.clone());
        Self {
            level,
            output,
            filter,
        }
    }

    /// Replaces the level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Replaces the destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Uses `filter` verbatim instead of the level
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directive applied when no custom filter is set
    #[must_use]
    pub fn default_directive(&self) -> String {
        format!(
            "conduitdash_core={level},conduitdash={level},sqlx=warn",
            level = self.level
        )
    }
}

/// Initializes the tracing subscriber with the given configuration
///
/// Only the first call installs a subscriber; later calls return
/// [`TracingError::AlreadyInitialized`].
pub fn init_tracing(config: &TracingConfig) -> TracingResult<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(TracingError::AlreadyInitialized);
    }

    let filter = match &config.filter {
        Some(custom) => EnvFilter::try_new(custom)
            .map_err(|e| TracingError::InitializationFailed(e.to_string()))?,
        None => EnvFilter::try_new(config.default_directive())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let (writer, ansi) = match &config.output {
        TracingOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        TracingOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        TracingOutput::File(path) => {
            let file = create_log_file(path)?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(ansi)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    tracing::debug!(level = %config.level, "Tracing initialized");

    Ok(())
}

fn create_log_file(path: &Path) -> TracingResult<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| TracingError::FileCreationFailed(e.to_string()))?;
    }
    File::create(path)
        .map_err(|e| TracingError::FileCreationFailed(format!("{}: {e}", path.display())))
}
