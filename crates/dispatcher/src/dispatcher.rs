//! Dispatcher - main loop for fan-out to sinks

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{FrameEnvelope, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::{RouteFilter, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    extra: Vec<SinkHandle>,
    input_rx: Receiver<FrameEnvelope>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: Receiver<FrameEnvelope>) -> Self {
        Self {
            config,
            extra: Vec::new(),
            input_rx,
        }
    }

    /// Add a sink that is not described by configuration
    pub fn with_handle(mut self, handle: SinkHandle) -> Self {
        self.extra.push(handle);
        self
    }

    /// Build and start the dispatcher
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Self::initialize_handles(&self.config).await?;
        handles.extend(self.extra);

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    async fn initialize_handles(
        config: &DispatcherConfig,
    ) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            handles.push(create_sink_handle(sink_config).await?);
        }
        Ok(handles)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let creation_error = |message: String| DispatcherError::sink_creation(&config.name, message);
    let filter = RouteFilter::from_params(&config.params).map_err(creation_error)?;

    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| creation_error(e.to_string()))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| creation_error(e.to_string()))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    Ok(handle.with_filter(filter))
}

/// Fans processed frames out to every sink
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: Receiver<FrameEnvelope>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: Receiver<FrameEnvelope>) -> Self {
        Self { handles, input_rx }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes frames from input and fans out to all sinks.
    /// Returns the final sink metrics once the input is closed.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut frame_count: u64 = 0;
        while let Ok(envelope) = self.input_rx.recv().await {
            frame_count += 1;
            self.dispatch_frame(envelope);

            if frame_count.is_multiple_of(1000) {
                debug!(frames = frame_count, "Dispatcher progress");
            }
        }

        info!(frames = frame_count, "Dispatcher input closed, shutting down");

        let handles = self.handles;
        let mut final_metrics = Vec::with_capacity(handles.len());
        for handle in handles {
            let name = handle.name().to_string();
            let metrics = handle.metrics().clone();
            handle.shutdown().await;
            final_metrics.push((name, metrics.snapshot()));
        }

        info!("Dispatcher shutdown complete");
        final_metrics
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }

    fn dispatch_frame(&self, envelope: FrameEnvelope) {
        let Some((last, rest)) = self.handles.split_last() else {
            return;
        };
        for handle in rest {
            handle.try_send(envelope.clone());
        }
        last.try_send(envelope);
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: Receiver<FrameEnvelope>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}
