//! `rtls-server`: runs the tracking pipeline, checks config files and
//! inspects recorded takes.

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_inspect_take, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG and friends may come from a local .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "rtls-server starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::InspectTake(args) => run_inspect_take(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "command failed");
    }

    result
}

/// Initialize logging based on CLI options. `RUST_LOG` wins over `-v`.
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
}
