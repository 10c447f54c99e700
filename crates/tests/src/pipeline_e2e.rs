//! End-to-end: NullSource -> FusionEngine -> Dispatcher -> sinks

use std::collections::HashMap;
use std::time::Duration;

use config_loader::{ConfigFormat, ConfigLoader};
use contracts::{
    FrameEnvelope, NullSourceConfig, RtlsConfig, SinkConfig, SinkType, SystemType, TrackableType,
};
use dispatcher::{create_dispatcher, FileSink, FusionEngine};
use ingestion::build_registry;
use tempfile::tempdir;

fn null_config(postprocess: bool) -> RtlsConfig {
    RtlsConfig {
        systems: vec![SystemType::Null],
        postprocess,
        null_source: NullSourceConfig {
            fps: 100.0,
            count: 4,
            presence_density: 1.0,
            set_id: true,
            seed: Some(7),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_e2e_null_pipeline() {
    let dir = tempdir().unwrap();
    let mut config = null_config(true);
    config.sinks = vec![
        SinkConfig {
            name: "file".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 256,
            params: HashMap::from([(
                "base_path".to_string(),
                dir.path().display().to_string(),
            )]),
        },
        SinkConfig {
            name: "log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: 256,
            params: HashMap::new(),
        },
    ];

    let engine = FusionEngine::new(&config).unwrap();
    let dispatcher = create_dispatcher(config.sinks.clone(), engine.subscribe())
        .await
        .unwrap();
    assert_eq!(dispatcher.sink_count(), 2);
    let dispatcher_handle = dispatcher.spawn();

    let registry = build_registry(&config);
    assert_eq!(registry.start_all(|system| engine.source_callback(system)), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(engine.is_receiving(SystemType::Null));

    registry.stop_all();
    let received = registry.metrics().snapshot().frames_received;
    engine.shutdown();

    let sink_metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
        .await
        .expect("dispatcher drains after engine shutdown")
        .unwrap();

    assert!(received >= 10, "only {received} source frames in 500ms");
    for (name, snapshot) in &sink_metrics {
        assert!(snapshot.write_count > 0, "sink {name} wrote nothing");
        assert_eq!(snapshot.failure_count, 0, "sink {name} failed writes");
    }

    let path = FileSink::stream_path(dir.path(), SystemType::Null, TrackableType::Sample);
    let content = std::fs::read_to_string(&path).unwrap();
    let envelopes: Vec<FrameEnvelope> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(!envelopes.is_empty());
    assert!(envelopes
        .iter()
        .all(|e| e.system == SystemType::Null && e.trackable_type == TrackableType::Sample));

    // the age gate holds back the first samples, after that all four show up
    let last = envelopes.last().unwrap();
    assert_eq!(last.frame.len(), 4);
    assert!(last.frame.trackables.iter().all(|t| t.id > 0));

    let ids: Vec<u64> = envelopes.iter().map(|e| e.frame.frame_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "frames out of order");
}

#[tokio::test]
async fn test_e2e_passthrough_counts_match() {
    let config = null_config(false);
    let engine = FusionEngine::new(&config).unwrap();
    let rx = engine.subscribe();

    let registry = build_registry(&config);
    registry.start_all(|system| engine.source_callback(system));
    tokio::time::sleep(Duration::from_millis(300)).await;
    registry.stop_all();

    // let in-flight callbacks finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = engine.source_status(SystemType::Null).unwrap();
    let delivered = crate::support::drain(&rx);

    assert!(status.frames_received > 0);
    assert_eq!(status.frames_suppressed, 0);
    assert_eq!(status.frames_dispatched, status.frames_received);
    assert_eq!(delivered.len() as u64, status.frames_dispatched);
    assert!(delivered.iter().all(|e| e.frame.len() == 4));
    engine.shutdown();
}

#[tokio::test]
async fn test_e2e_config_file_drives_engine() {
    let config = ConfigLoader::load_from_str(
        r#"
systems = ["null"]

[null_source]
fps = 100.0
count = 2
seed = 3

[[postprocessors]]
name = "null-markers"
system = "null"
trackable_type = "sample"
stages = ["remove_unidentifiable", "continuity"]
"#,
        ConfigFormat::Toml,
    )
    .unwrap();

    let engine = FusionEngine::new(&config).unwrap();
    let rx = engine.subscribe();
    let registry = build_registry(&config);
    registry.start_all(|system| engine.source_callback(system));

    let first = crate::support::next(&rx).await;
    assert_eq!(first.frame.len(), 2);
    registry.stop_all();

    let snapshots = engine.postprocessor_snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].0, "null-markers");
    assert!(snapshots[0].1.queued > 0);
    engine.shutdown();
}
