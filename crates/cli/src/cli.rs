//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// rtls-server - real-time location fusion and take playback
#[derive(Parser, Debug)]
#[command(
    name = "rtls-server",
    author,
    version,
    about = "Real-time location system fusion server",
    long_about = "Fuses trackable positions from one or more tracking systems, keeps \n\
                  identities stable across frames, filters positions, and routes the \n\
                  result to configured sinks. Takes can be recorded to .c3d files and \n\
                  played back in place of a live system."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "RTLS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "RTLS_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the fusion pipeline
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Show the contents of a recorded take
    InspectTake(InspectTakeArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "rtls.toml", env = "RTLS_CONFIG")]
    pub config: PathBuf,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "RTLS_DURATION")]
    pub duration: u64,

    /// Record a take for the whole run
    #[arg(long)]
    pub record: bool,

    /// Play this take instead of the live data of its systems
    #[arg(long, value_name = "TAKE", env = "RTLS_PLAY")]
    pub play: Option<PathBuf>,

    /// Loop playback (overrides the configuration)
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// Playback speed multiplier (overrides the configuration)
    #[arg(long, env = "RTLS_PLAYBACK_SPEED")]
    pub speed: Option<f32>,

    /// Folder for recorded takes (overrides the configuration)
    #[arg(long, env = "RTLS_TAKE_FOLDER")]
    pub take_folder: Option<PathBuf>,

    /// Validate configuration and exit without running the pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", env = "RTLS_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "rtls.toml", env = "RTLS_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "rtls.toml", env = "RTLS_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `inspect-take` command
#[derive(Parser, Debug)]
pub struct InspectTakeArgs {
    /// Take file (.c3d)
    pub take: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also list every point label with its description
    #[arg(long)]
    pub labels: bool,
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
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
