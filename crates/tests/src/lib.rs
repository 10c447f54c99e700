//! # Integration Tests
//!
//! Cross-crate scenarios that no single crate can exercise on its own:
//! liveness, record and replay, live/playback arbitration, identity
//! continuity through a running postprocessor, and a full
//! source-to-sink pipeline.

#[cfg(test)]
mod support;

#[cfg(test)]
mod engine_scenarios;

#[cfg(test)]
mod postprocess_properties;

#[cfg(test)]
mod take_scenarios;

#[cfg(test)]
mod pipeline_e2e;
