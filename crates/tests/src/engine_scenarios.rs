//! Fusion engine scenarios: liveness and live/playback arbitration

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    Frame, FrameOrigin, PlaybackConfig, PlaybackTarget, Position, SystemType, Trackable,
    TrackableType,
};
use dispatcher::{DispatchError, FusionEngine};
use recorder::{tagged, Player, Take};
use tempfile::tempdir;

use crate::support::{drain, next, passthrough_config, samples};

#[tokio::test]
async fn test_stale_detection() {
    let engine = FusionEngine::new(&passthrough_config(&[SystemType::Null])).unwrap();
    assert!(!engine.is_receiving(SystemType::Null));

    // 50 ms spacing for 500 ms
    for i in 0..10 {
        engine.dispatch(SystemType::Null, samples(&[(1, i as f32)])).unwrap();
        assert!(engine.is_receiving(SystemType::Null), "receiving at frame {i}");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.is_receiving(SystemType::Null), "receiving after gap {i}");
    }

    // stop_gap defaults to 100 ms; give the poller a few periods beyond it
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = engine.source_status(SystemType::Null).unwrap();
    assert!(!status.receiving);
    assert_eq!(status.frames_received, 10);
    assert!(status.fps > 0.0);
}

#[tokio::test]
async fn test_dispatch_failures_are_reported() {
    let engine = FusionEngine::new(&passthrough_config(&[SystemType::Null])).unwrap();

    assert_eq!(
        engine.dispatch(SystemType::Motive, samples(&[(1, 0.0)])),
        Err(DispatchError::SystemDisabled {
            system: SystemType::Motive
        })
    );
    assert!(matches!(
        engine.dispatch(SystemType::Invalid, samples(&[(1, 0.0)])),
        Err(DispatchError::InvalidRoute { .. })
    ));

    engine.shutdown();
    assert_eq!(
        engine.dispatch(SystemType::Null, samples(&[(1, 0.0)])),
        Err(DispatchError::ShutDown)
    );
}

/// Null-system take: `frames` ticks of one trackable (id 7) moving on y
fn write_null_take(path: &Path, frames: usize) {
    let mut take = Take::new(path);
    for tick in 0..frames {
        let frame = Frame::new(vec![
            Trackable::at(Position::new(7.0, tick as f32 * 0.01, 0.0)).with_id(7),
        ]);
        take.append(
            SystemType::Null,
            60.0,
            tagged(SystemType::Null, TrackableType::Sample, frame),
        )
        .unwrap();
    }
    take.finish();
    take.into_container(|_| {}).unwrap().write(path).unwrap();
}

#[tokio::test]
async fn test_playback_suppresses_live() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("null.c3d");
    write_null_take(&path, 30);

    let engine = Arc::new(
        FusionEngine::new(&passthrough_config(&[SystemType::Null, SystemType::Motive])).unwrap(),
    );
    let rx = engine.subscribe();

    let target: Arc<dyn PlaybackTarget> = engine.clone();
    let player = Player::new(
        PlaybackConfig {
            loop_playback: true,
            ..Default::default()
        },
        target,
    );
    player.load(&path).unwrap();
    player.play().unwrap();

    // The first playback frame marks the system as replayed
    let first = next(&rx).await;
    assert_eq!(first.origin, FrameOrigin::Playback);
    assert!(engine.is_playback_active(SystemType::Null));

    for i in 0..5 {
        assert_eq!(
            engine.dispatch(SystemType::Null, samples(&[(1, i as f32)])),
            Err(DispatchError::Suppressed {
                system: SystemType::Null
            })
        );
        engine
            .dispatch(SystemType::Motive, samples(&[(2, i as f32)]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    player.stop();
    let during = drain(&rx);
    assert!(
        !during
            .iter()
            .any(|e| e.system == SystemType::Null && e.origin == FrameOrigin::Live),
        "live null frame leaked through playback"
    );
    let motive_live = during
        .iter()
        .filter(|e| e.system == SystemType::Motive && e.origin == FrameOrigin::Live)
        .count();
    assert_eq!(motive_live, 5);
    assert!(during
        .iter()
        .any(|e| e.system == SystemType::Null && e.origin == FrameOrigin::Playback));
    assert_eq!(
        engine.source_status(SystemType::Null).unwrap().frames_suppressed,
        5
    );

    // Live data flows again once playback stopped
    assert!(!engine.is_playback_active(SystemType::Null));
    engine.dispatch(SystemType::Null, samples(&[(1, 9.0)])).unwrap();
    let resumed = next(&rx).await;
    assert_eq!(resumed.system, SystemType::Null);
    assert_eq!(resumed.origin, FrameOrigin::Live);
}
