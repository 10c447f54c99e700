//! # Observability
//!
//! Tracing and Prometheus setup for the RTLS server.
//!
//! ## Features
//!
//! - Tracing initialisation (JSON / pretty / compact, `RUST_LOG` aware)
//! - Prometheus exporter
//! - Output frame metrics and run summaries
//!
//! ## Example
//!
//! ```ignore
//! observability::init()?;
//!
//! while let Ok(envelope) = frames.recv().await {
//!     observability::record_frame_output(&envelope);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    record_frame_output, record_latency_sample, record_sink_totals, FrameMetricsAggregator,
    MetricsSummary, RunningStats, StatsSummary,
};

/// Initialise tracing (JSON, `RUST_LOG`) and Prometheus on 0.0.0.0:9000
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port, `None` disables the exporter
    pub metrics_port: Option<u16>,
    /// Filter used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(9000),
            default_log_level: "info".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Multi-line, human readable
    Pretty,
    /// Single line
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initialise with explicit settings.
///
/// Fails if a global subscriber or metrics recorder is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(config.log_format))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        // worker threads are named after their postprocessor
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

fn install_exporter(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;
    tracing::info!(port, "Prometheus metrics endpoint listening");
    Ok(())
}

/// Install only the Prometheus exporter, for when tracing is set up elsewhere
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}
