//! Shared fixtures

use std::time::Duration;

use async_channel::Receiver;
use contracts::{Frame, FrameEnvelope, Position, RtlsConfig, SourceFrame, SystemType, Trackable};

/// Config with the given systems enabled and no postprocessing
pub fn passthrough_config(systems: &[SystemType]) -> RtlsConfig {
    RtlsConfig {
        systems: systems.to_vec(),
        postprocess: false,
        ..Default::default()
    }
}

/// Sample frame with one id-keyed trackable per `(id, x)`
pub fn samples(points: &[(i64, f32)]) -> SourceFrame {
    SourceFrame::samples(Frame::new(
        points
            .iter()
            .map(|&(id, x)| Trackable::at(Position::new(x, 0.0, 0.0)).with_id(id))
            .collect(),
    ))
}

/// Next envelope, failing the test after two seconds
pub async fn next(rx: &Receiver<FrameEnvelope>) -> FrameEnvelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within timeout")
        .expect("bus open")
}

/// Everything currently queued on `rx`
pub fn drain(rx: &Receiver<FrameEnvelope>) -> Vec<FrameEnvelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}
