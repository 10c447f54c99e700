//! Postprocessing properties across contracts and postprocess

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::{
    Frame, FrameEnvelope, FrameHandler, KeyType, Position, PostprocessorConfig, StageKind,
    SystemType, Trackable, TrackableKey, TrackableType,
};
use postprocess::{FramePipeline, IdDictionary, Postprocessor};

fn config(stages: Vec<StageKind>) -> PostprocessorConfig {
    PostprocessorConfig {
        stages,
        ..PostprocessorConfig::default_for(SystemType::Null, TrackableType::Sample)
    }
}

fn cuid_at(cuid: &str, x: f32) -> Trackable {
    Trackable::at(Position::new(x, 0.0, 0.0)).with_cuid(cuid)
}

#[test]
fn test_key_injectivity_across_types() {
    let by_id = TrackableKey::derive(&Trackable::default().with_id(5));
    let by_cuid = TrackableKey::derive(&Trackable::default().with_cuid("5"));
    let by_name = TrackableKey::derive(&Trackable::default().with_name("5"));
    assert_ne!(by_id, by_cuid);
    assert_ne!(by_cuid, by_name);
    assert_ne!(by_id, by_name);
    assert_eq!(by_id.data(), by_cuid.data());
}

#[test]
fn test_reconcile_round_trip() {
    for key in [
        TrackableKey::from_parts(KeyType::Id, "42"),
        TrackableKey::from_parts(KeyType::Cuid, "00ff00ff00ff00ff"),
        TrackableKey::from_parts(KeyType::Name, "wand"),
    ] {
        let mut blank = Trackable::default();
        assert!(key.reconcile(&mut blank), "{key} did not reconcile");
        assert_eq!(TrackableKey::derive(&blank), key);
    }
}

#[test]
fn test_fifo_processing() {
    let pp = Postprocessor::new(&PostprocessorConfig::default_for(
        SystemType::Null,
        TrackableType::Sample,
    ))
    .unwrap();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let handler: FrameHandler = Arc::new(move |envelope: FrameEnvelope| {
        sink.lock().unwrap().push(envelope.frame.frame_id);
    });

    const N: u64 = 200;
    for frame_id in 1..=N {
        let frame = Frame {
            frame_id,
            ..Frame::new(vec![
                Trackable::at(Position::new(frame_id as f32 * 0.001, 0.0, 0.0)).with_id(1),
            ])
        };
        let envelope = FrameEnvelope::new(SystemType::Null, TrackableType::Sample, frame);
        assert!(pp.process_and_send(envelope, Arc::clone(&handler)));
        if frame_id == N / 2 {
            // resets are ordered with frames
            assert!(pp.reset());
        }
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while pp.snapshot().processed < N + 1 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let delivered = delivered.lock().unwrap().clone();
    assert_eq!(delivered, (1..=N).collect::<Vec<_>>());

    let snapshot = pp.snapshot();
    assert_eq!(snapshot.processed, N + 1);
    assert_eq!(snapshot.resets, 1);
    pp.shutdown();
}

#[test]
fn test_continuity_stability() {
    let mut pipeline = FramePipeline::new(&config(vec![
        StageKind::RemoveUnidentifiable,
        StageKind::Continuity,
    ]));
    let now = Instant::now();

    let mut first = Frame::new(vec![cuid_at("aaaa", 0.0)]);
    pipeline.process(&mut first, now);

    // temporary key changes while the sample barely moves
    let mut second = Frame::new(vec![cuid_at("bbbb", 0.1)]);
    pipeline.process(&mut second, now);
    assert_eq!(second.trackables[0].cuid, "aaaa");

    let mut third = Frame::new(vec![cuid_at("cccc", 0.2)]);
    pipeline.process(&mut third, now);
    assert_eq!(third.trackables[0].cuid, "aaaa");
    assert_eq!(
        pipeline
            .resolver()
            .resolve_key(&TrackableKey::from("2cccc"))
            .as_str(),
        "2aaaa"
    );
}

#[test]
fn test_out_of_radius_rejection() {
    let mut pipeline = FramePipeline::new(&config(vec![StageKind::Continuity]));
    let now = Instant::now();

    let mut first = Frame::new(vec![cuid_at("a", 0.0)]);
    pipeline.process(&mut first, now);

    let mut second = Frame::new(vec![cuid_at("far", 3.0), cuid_at("near", 0.2)]);
    pipeline.process(&mut second, now);

    let far = second.trackables.iter().find(|t| t.position.x == 3.0).unwrap();
    assert_eq!(far.cuid, "far");
    let near = second.trackables.iter().find(|t| t.position.x == 0.2).unwrap();
    assert_eq!(near.cuid, "a");
    assert!(!pipeline
        .resolver()
        .mappings()
        .contains_key(&TrackableKey::from("2far")));
}

#[test]
fn test_filter_cull_starts_fresh() {
    let mut cfg = config(vec![StageKind::Filters]);
    cfg.filters.cull_period_ms = 100;
    cfg.filters.inactivity_timeout_ms = 200;
    let mut pipeline = FramePipeline::new(&cfg);
    let key = TrackableKey::from_parts(KeyType::Id, "9");
    let t0 = Instant::now();

    for i in 0..5u32 {
        let mut frame = Frame::new(vec![Trackable::at(Position::new(1.0, 0.0, 0.0)).with_id(9)]);
        pipeline.process(&mut frame, t0 + Duration::from_millis(10 * u64::from(i)));
    }
    assert_eq!(pipeline.filters().get(key.as_str()).unwrap().samples(), 5);

    // no data for longer than the inactivity timeout
    let mut empty = Frame::default();
    pipeline.process(&mut empty, t0 + Duration::from_millis(500));
    assert!(!pipeline.filters().contains(key.as_str()));

    let mut again = Frame::new(vec![Trackable::at(Position::new(4.0, 0.0, 0.0)).with_id(9)]);
    pipeline.process(&mut again, t0 + Duration::from_millis(520));
    let filter = pipeline.filters().get(key.as_str()).unwrap();
    assert_eq!(filter.samples(), 1);
}

#[test]
fn test_dictionary_fallback() {
    assert_eq!(IdDictionary::passthrough().lookup(42), 42);

    let missing = IdDictionary::load(std::path::Path::new("/nonexistent/dict.json"));
    assert!(!missing.is_valid());
    assert_eq!(missing.lookup(42), 42);

    assert!(IdDictionary::from_json(r#"{"nBits": 2, "dict": [1, 2, 3]}"#).is_err());

    let dict = IdDictionary::from_json(r#"{"nBits": 2, "dict": [10, 11, 12, 13]}"#).unwrap();
    assert_eq!(dict.lookup(2), 12);
    assert_eq!(dict.lookup(9), -1);

    // map-ids leaves ids alone when the dictionary is unusable
    let mut pipeline =
        FramePipeline::with_dictionary(&config(vec![StageKind::MapIds]), missing);
    let mut frame = Frame::new(vec![Trackable::at(Position::new(0.0, 0.0, 0.0)).with_id(7)]);
    pipeline.process(&mut frame, Instant::now());
    assert_eq!(frame.trackables[0].id, 7);
}
