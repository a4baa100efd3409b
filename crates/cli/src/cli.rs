//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Event Batcher - batch JSON events from stdin to an HTTP collector
#[derive(Parser, Debug)]
#[command(
    name = "event-batcher",
    author,
    version,
    about = "Client-side event batching dispatcher",
    long_about = "Reads JSON events (one object per line) from stdin, stamps them with a \n\
                  per-process dispatcher id and timestamp, and posts them in batches to \n\
                  the configured collector. Pending events are persisted between runs."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_BATCHER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENT_BATCHER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read events from stdin and dispatch them
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and pending batch information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "event-batcher.toml",
        env = "EVENT_BATCHER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the collector endpoint from configuration
    #[arg(long, env = "EVENT_BATCHER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Override the batch threshold from configuration
    #[arg(long, env = "EVENT_BATCHER_THRESHOLD")]
    pub threshold: Option<usize>,

    /// Field added to every event (KEY=VALUE, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Log batches instead of posting them
    #[arg(long)]
    pub dry_run: bool,

    /// Log every event as it is sent
    #[arg(long, env = "EVENT_BATCHER_DEBUG_LOG")]
    pub debug_log: bool,

    /// Send the last event of the input forcefully
    #[arg(long)]
    pub force_last: bool,

    /// Seconds to wait for in-flight posts before exiting
    #[arg(long, default_value = "5", env = "EVENT_BATCHER_IDLE_TIMEOUT")]
    pub idle_timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "EVENT_BATCHER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "event-batcher.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "event-batcher.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Read the persisted pending batch
    #[arg(long)]
    pub pending: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
