//! FileSink - JSON lines per stream
//!
//! Layout: `<base_path>/<system>/<trackable_type>.jsonl`, one serialized
//! `FrameEnvelope` per line.

use contracts::{ContractError, DataSink, FrameEnvelope, SystemType, TrackableType};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Sink that appends frames to per-stream files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writers: HashMap<(SystemType, TrackableType), BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            writers: HashMap::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    /// File that frames of one stream go to
    pub fn stream_path(base: &Path, system: SystemType, trackable_type: TrackableType) -> PathBuf {
        base.join(system.as_str())
            .join(format!("{}.jsonl", trackable_type.as_str()))
    }

    fn writer(
        &mut self,
        system: SystemType,
        trackable_type: TrackableType,
    ) -> std::io::Result<&mut BufWriter<File>> {
        use std::collections::hash_map::Entry;
        match self.writers.entry((system, trackable_type)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = Self::stream_path(&self.config.base_path, system, trackable_type);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                debug!(sink = %self.name, path = %path.display(), "opened stream file");
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    fn write_line(&mut self, envelope: &FrameEnvelope) -> std::io::Result<()> {
        let line = serde_json::to_vec(envelope)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let writer = self.writer(envelope.system, envelope.trackable_type)?;
        writer.write_all(&line)?;
        writer.write_all(b"\n")
    }

    fn persist_frame(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError> {
        self.write_line(envelope).map_err(|e| {
            error!(
                sink = %self.name,
                frame_id = envelope.frame.frame_id,
                error = %e,
                "Write failed"
            );
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    fn flush_all(&mut self) -> Result<(), ContractError> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, envelope),
        fields(sink = %self.name, frame_id = envelope.frame.frame_id)
    )]
    async fn write(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError> {
        self.persist_frame(envelope)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.flush_all()
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush_all()?;
        self.writers.clear();
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position, Trackable};
    use tempfile::tempdir;

    fn envelope(system: SystemType, frame_id: u64) -> FrameEnvelope {
        let frame = Frame {
            frame_id,
            ..Frame::new(vec![Trackable::at(Position::new(1.0, 2.0, 3.0)).with_id(7)])
        };
        FrameEnvelope::new(system, TrackableType::Sample, frame)
    }

    #[tokio::test]
    async fn test_file_sink_write() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
        };

        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.write(&envelope(SystemType::Null, 1)).await.unwrap();
        sink.write(&envelope(SystemType::Null, 2)).await.unwrap();
        sink.write(&envelope(SystemType::Motive, 1)).await.unwrap();
        sink.close().await.unwrap();

        let null_path = FileSink::stream_path(dir.path(), SystemType::Null, TrackableType::Sample);
        let content = fs::read_to_string(null_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: FrameEnvelope = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.frame.frame_id, 2);
        assert_eq!(parsed.frame.trackables[0].id, 7);

        let motive_path =
            FileSink::stream_path(dir.path(), SystemType::Motive, TrackableType::Sample);
        assert!(motive_path.exists());
    }

    #[test]
    fn test_default_base_path() {
        let config = FileSinkConfig::from_params(&HashMap::new());
        assert_eq!(config.base_path, PathBuf::from("./output"));
    }
}
