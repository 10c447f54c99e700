//! Record and replay through the recorder, container and player

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    Frame, FrameEnvelope, FrameOrigin, PlaybackConfig, PlaybackTarget, Position, RecorderConfig,
    SystemType, Trackable, TrackableType,
};
use dispatcher::FusionEngine;
use recorder::{Player, PlayerTake, Recorder, RecorderError, RecordingEvent};
use tempfile::tempdir;

use crate::support::{drain, passthrough_config};

const IDS: [i64; 3] = [3, 5, 8];

fn position(id: i64, tick: usize) -> Position {
    Position::new(id as f32, 1.0 + tick as f32 * 0.125, -0.5 * id as f32)
}

fn tick_envelope(tick: usize) -> FrameEnvelope {
    let frame = Frame::new(
        IDS.iter()
            .map(|&id| Trackable::at(position(id, tick)).with_id(id))
            .collect(),
    );
    FrameEnvelope::new(SystemType::Null, TrackableType::Sample, frame).with_fps(30.0)
}

#[tokio::test]
async fn test_record_playback_round_trip() {
    let dir = tempdir().unwrap();
    let recorder = Recorder::new(RecorderConfig {
        take_folder: dir.path().to_path_buf(),
        take_prefix: "roundtrip".to_string(),
    })
    .unwrap();
    let mut events = recorder.subscribe();

    let path = recorder.start_recording(None).unwrap();
    for tick in 0..10 {
        assert!(recorder.record(&tick_envelope(tick)));
    }
    recorder.stop_recording(None).unwrap();
    assert!(recorder.wait_idle(Duration::from_secs(10)));

    let mut saved = None;
    while let Ok(event) = events.try_recv() {
        if let RecordingEvent::Ended { path, saved: ok } = event {
            saved = Some((path, ok));
        }
    }
    assert_eq!(saved, Some((path.clone(), true)));

    let take = PlayerTake::load(&path).unwrap();
    assert_eq!(take.frame_count(), 10);
    assert_eq!(take.fps(), 30.0);

    let engine = Arc::new(FusionEngine::new(&passthrough_config(&[SystemType::Null])).unwrap());
    let rx = engine.subscribe();
    let target: Arc<dyn PlaybackTarget> = engine.clone();
    let player = Player::new(
        PlaybackConfig {
            loop_playback: false,
            speed: 2.0,
            ..Default::default()
        },
        target,
    );
    player.load(&path).unwrap();
    player.play().unwrap();
    assert!(player.wait_finished(Duration::from_secs(5)));

    let replayed: Vec<FrameEnvelope> = drain(&rx)
        .into_iter()
        .filter(|e| e.trackable_type == TrackableType::Sample)
        .collect();
    assert_eq!(replayed.len(), 10);

    for (tick, envelope) in replayed.iter().enumerate() {
        assert_eq!(envelope.origin, FrameOrigin::Playback);
        assert_eq!(envelope.system, SystemType::Null);
        assert_eq!(envelope.frame.len(), IDS.len());
        for &id in &IDS {
            let t = envelope
                .frame
                .trackables
                .iter()
                .find(|t| t.id == id)
                .unwrap_or_else(|| panic!("id {id} missing at tick {tick}"));
            let expected = position(id, tick);
            assert!((t.position.x - expected.x).abs() < 1e-5);
            assert!((t.position.y - expected.y).abs() < 1e-5);
            assert!((t.position.z - expected.z).abs() < 1e-5);
        }
    }
    let ids: Vec<u64> = replayed.iter().map(|e| e.frame.frame_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "frames out of order: {ids:?}");

    recorder.shutdown();
}

#[tokio::test]
async fn test_empty_take_is_not_written() {
    let dir = tempdir().unwrap();
    let recorder = Recorder::new(RecorderConfig {
        take_folder: dir.path().to_path_buf(),
        take_prefix: "empty".to_string(),
    })
    .unwrap();

    let path = recorder.start_recording(None).unwrap();
    let result = recorder.stop_recording(None);
    assert!(recorder.wait_idle(Duration::from_secs(5)));
    assert!(result.is_err() || !path.exists());
    assert!(!path.exists());
    assert!(!recorder.is_recording());
}

#[test]
fn test_player_rejects_bad_takes() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        PlayerTake::load(&dir.path().join("take.txt")),
        Err(RecorderError::BadExtension { .. })
    ));
    assert!(matches!(
        PlayerTake::load(&dir.path().join("gone.c3d")),
        Err(RecorderError::MissingTake { .. })
    ));

    let garbage = dir.path().join("garbage.c3d");
    std::fs::write(&garbage, b"definitely not a take").unwrap();
    assert!(PlayerTake::load(&garbage).is_err());
}
