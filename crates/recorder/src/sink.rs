//! RecorderSink - lets the recorder consume the sink fan-out

use std::sync::Arc;

use contracts::{ContractError, DataSink, FrameEnvelope};
use tracing::{debug, instrument};

use crate::recorder::Recorder;

/// Sink that forwards processed frames into a [`Recorder`]
pub struct RecorderSink {
    name: String,
    recorder: Arc<Recorder>,
    recorded: u64,
}

impl RecorderSink {
    pub fn new(name: impl Into<String>, recorder: Arc<Recorder>) -> Self {
        Self {
            name: name.into(),
            recorder,
            recorded: 0,
        }
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }
}

impl DataSink for RecorderSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "recorder_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, frame_id = envelope.frame.frame_id)
    )]
    async fn write(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError> {
        // Frames outside a recording session are not an error
        if self.recorder.record(envelope) {
            self.recorded += 1;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "recorder_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, recorded = self.recorded, "RecorderSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position, RecorderConfig, SystemType, Trackable, TrackableType};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sink_records_only_while_recording() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(
            Recorder::new(RecorderConfig {
                take_folder: dir.path().to_path_buf(),
                take_prefix: "sink".into(),
            })
            .unwrap(),
        );
        let mut sink = RecorderSink::new("recorder", recorder.clone());
        let envelope = FrameEnvelope::new(
            SystemType::Null,
            TrackableType::Sample,
            Frame::new(vec![Trackable::at(Position::new(0.0, 1.0, 2.0)).with_id(1)]),
        )
        .with_fps(60.0);

        sink.write(&envelope).await.unwrap();
        assert_eq!(sink.recorded(), 0);

        recorder.start_recording(None).unwrap();
        sink.write(&envelope).await.unwrap();
        sink.write(&envelope).await.unwrap();
        assert_eq!(sink.recorded(), 2);
    }
}
