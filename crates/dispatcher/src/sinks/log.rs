//! LogSink - logs frame summary via tracing

use contracts::{ContractError, DataSink, FrameEnvelope};
use tracing::{info, instrument};

/// Sink that logs frame summaries for debugging
pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    fn log_frame_summary(&self, envelope: &FrameEnvelope) {
        let frame = &envelope.frame;
        let identified = frame.trackables.iter().filter(|t| t.id > 0).count();

        info!(
            sink = %self.name,
            system = %envelope.system,
            trackable_type = %envelope.trackable_type,
            frame_id = frame.frame_id,
            timestamp_ms = frame.timestamp_ms,
            trackables = frame.len(),
            identified,
            fps = envelope.fps,
            origin = ?envelope.origin,
            "Frame received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, frame_id = envelope.frame.frame_id)
    )]
    async fn write(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError> {
        self.log_frame_summary(envelope);
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.written, "LogSink closed");
        Ok(())
    }
}
