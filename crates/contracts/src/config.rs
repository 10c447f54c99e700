//! RtlsConfig - Config Loader output
//!
//! Describes the whole server: enabled tracking systems, postprocessing
//! streams, engine timing, recorder/player and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use validator::Validate;

use crate::{SystemType, TrackableType};

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RtlsConfig {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,

    /// Enabled tracking systems
    #[serde(default = "default_systems")]
    pub systems: Vec<SystemType>,

    /// Global postprocessing switch
    #[serde(default = "default_true")]
    pub postprocess: bool,

    /// Enable recorder and player
    #[serde(default = "default_true")]
    pub player: bool,

    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,

    /// Postprocessing streams; empty means one default stream per
    /// enabled system and trackable type
    #[serde(default)]
    #[validate(nested)]
    pub postprocessors: Vec<PostprocessorConfig>,

    #[serde(default)]
    #[validate(nested)]
    pub null_source: NullSourceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    #[validate(nested)]
    pub playback: PlaybackConfig,

    /// Output routing
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

impl Default for RtlsConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            systems: default_systems(),
            postprocess: true,
            player: true,
            engine: EngineConfig::default(),
            postprocessors: Vec::new(),
            null_source: NullSourceConfig::default(),
            recorder: RecorderConfig::default(),
            playback: PlaybackConfig::default(),
            sinks: Vec::new(),
        }
    }
}

impl RtlsConfig {
    pub fn is_enabled(&self, system: SystemType) -> bool {
        self.systems.contains(&system)
    }

    /// Postprocessor streams to build.
    ///
    /// Explicit entries win; otherwise one default stream is created per
    /// enabled system and trackable type.
    pub fn effective_postprocessors(&self) -> Vec<PostprocessorConfig> {
        if !self.postprocessors.is_empty() {
            return self.postprocessors.clone();
        }
        self.systems
            .iter()
            .flat_map(|&system| {
                TrackableType::ALL
                    .into_iter()
                    .map(move |ttype| PostprocessorConfig::default_for(system, ttype))
            })
            .collect()
    }
}

fn default_systems() -> Vec<SystemType> {
    vec![SystemType::Null]
}

fn default_true() -> bool {
    true
}

/// Project metadata, also written into take headers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub company: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            description: String::new(),
            company: String::new(),
        }
    }
}

fn default_project_name() -> String {
    "rtls".to_string()
}

/// Fusion engine timing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Liveness threshold: receiving is true while the last arrival is
    /// younger than this
    #[serde(default = "default_stop_gap_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub stop_gap_ms: u64,

    /// FPS / liveness polling period
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1, max = 1000))]
    pub poll_interval_ms: u64,

    /// Sliding window used to count arrivals
    #[serde(default = "default_fps_window_ms")]
    #[validate(range(min = 10, max = 60000))]
    pub fps_window_ms: u64,

    /// EMA decay applied per polling tick to the fps estimate
    #[serde(default = "default_decay")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub fps_decay: f64,

    /// EMA decay applied per sample to the latency estimate
    #[serde(default = "default_decay")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub latency_decay: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_gap_ms: default_stop_gap_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fps_window_ms: default_fps_window_ms(),
            fps_decay: default_decay(),
            latency_decay: default_decay(),
        }
    }
}

fn default_stop_gap_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    16
}

fn default_fps_window_ms() -> u64 {
    1000
}

fn default_decay() -> f64 {
    0.95
}

/// One postprocessing pass over the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Dictionary id remap
    MapIds,
    /// Drop trackables without a usable identity
    RemoveUnidentifiable,
    /// Hungarian identity continuity
    Continuity,
    /// Per-key filter chain
    Filters,
}

/// Postprocessing stream for one (system, trackable type)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostprocessorConfig {
    #[validate(length(min = 1))]
    pub name: String,

    pub system: SystemType,

    pub trackable_type: TrackableType,

    /// Ordered stage list
    #[serde(default = "default_stages")]
    pub stages: Vec<StageKind>,

    /// `{"nBits": N, "dict": [...]}` id dictionary
    #[serde(default)]
    pub dictionary_path: Option<PathBuf>,

    #[serde(default)]
    #[validate(nested)]
    pub continuity: ContinuityConfig,

    #[serde(default)]
    #[validate(nested)]
    pub filters: FilterConfig,
}

impl PostprocessorConfig {
    pub fn default_for(system: SystemType, trackable_type: TrackableType) -> Self {
        Self {
            name: format!("{system}-{trackable_type}"),
            system,
            trackable_type,
            stages: default_stages(),
            dictionary_path: None,
            continuity: ContinuityConfig::default(),
            filters: FilterConfig::default(),
        }
    }
}

fn default_stages() -> Vec<StageKind> {
    vec![
        StageKind::MapIds,
        StageKind::RemoveUnidentifiable,
        StageKind::Continuity,
        StageKind::Filters,
    ]
}

/// Which identity-permanence class takes part in continuity matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingClass {
    #[default]
    Temporary,
    Permanent,
    Both,
}

/// Hungarian continuity resolver knobs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContinuityConfig {
    /// Comma separated key types treated as temporary
    #[serde(default = "default_temporary_key_types")]
    pub temporary_key_types: String,

    /// Comma separated key types treated as permanent
    #[serde(default = "default_permanent_key_types")]
    pub permanent_key_types: String,

    /// Maximum match distance in meters
    #[serde(default = "default_radius")]
    #[validate(range(exclusive_min = 0.0))]
    pub radius: f32,

    #[serde(default = "default_mapping_from")]
    pub mapping_from: MappingClass,

    #[serde(default)]
    pub mapping_to: MappingClass,

    /// Maximum hops when collapsing mapping chains
    #[serde(default = "default_recursion_limit")]
    #[validate(range(min = 1, max = 10000))]
    pub recursion_limit: usize,

    /// Drop FROM/TO pairs with identical keys before solving
    #[serde(default = "default_true")]
    pub remove_exact_matches: bool,

    /// Give unmatched unidentifiable samples a fresh synthetic cuid
    #[serde(default)]
    pub assign_cuid_to_unmatched: bool,

    /// Allow a permanent key in the current frame to be remapped
    #[serde(default)]
    pub allow_remapping_from_permanent: bool,

    /// Allow any key to be remapped onto an existing permanent key
    #[serde(default = "default_true")]
    pub allow_remapping_to_permanent: bool,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            temporary_key_types: default_temporary_key_types(),
            permanent_key_types: default_permanent_key_types(),
            radius: default_radius(),
            mapping_from: default_mapping_from(),
            mapping_to: MappingClass::Temporary,
            recursion_limit: default_recursion_limit(),
            remove_exact_matches: true,
            assign_cuid_to_unmatched: false,
            allow_remapping_from_permanent: false,
            allow_remapping_to_permanent: true,
        }
    }
}

fn default_temporary_key_types() -> String {
    "cuid".to_string()
}

fn default_permanent_key_types() -> String {
    "id,name".to_string()
}

fn default_radius() -> f32 {
    0.5
}

fn default_mapping_from() -> MappingClass {
    MappingClass::Both
}

fn default_recursion_limit() -> usize {
    100
}

/// One filter stage with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterStageConfig {
    /// Valid only after `min_samples`, invalid after `max_missing` misses
    AgeGate {
        #[serde(default = "default_min_samples")]
        min_samples: u32,
        #[serde(default = "default_max_missing")]
        max_missing: u32,
    },
    /// Signed axis permutation plus uniform scale
    AxisRemap {
        #[serde(default = "default_axes")]
        axes: [String; 3],
        #[serde(default = "default_scale")]
        scale: f32,
    },
    /// Per-axis constant velocity Kalman filter
    Kalman {
        #[serde(default = "default_process_noise")]
        process_noise: f32,
        #[serde(default = "default_measurement_noise")]
        measurement_noise: f32,
    },
    /// Exponential approach towards the input
    Easing {
        #[serde(default = "default_easing")]
        factor: f32,
    },
    /// Clamp per-tick displacement
    RateLimit {
        #[serde(default = "default_max_step")]
        max_step: f32,
    },
    /// Reject single-tick jumps
    ContinuityGate {
        #[serde(default = "default_max_jump")]
        max_jump: f32,
        #[serde(default = "default_max_rejections")]
        max_rejections: u32,
    },
}

/// Parse an axis remap entry such as `"x"` or `"-z"` into
/// (source axis index, sign).
pub fn parse_axis(text: &str) -> Option<(usize, f32)> {
    let text = text.trim();
    let (sign, axis) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    let index = match axis {
        "x" | "X" => 0,
        "y" | "Y" => 1,
        "z" | "Z" => 2,
        _ => return None,
    };
    Some((index, sign))
}

fn default_min_samples() -> u32 {
    3
}

fn default_max_missing() -> u32 {
    10
}

fn default_axes() -> [String; 3] {
    ["x".to_string(), "y".to_string(), "z".to_string()]
}

fn default_scale() -> f32 {
    1.0
}

fn default_process_noise() -> f32 {
    1e-3
}

fn default_measurement_noise() -> f32 {
    1e-2
}

fn default_easing() -> f32 {
    0.5
}

fn default_max_step() -> f32 {
    0.25
}

fn default_max_jump() -> f32 {
    0.5
}

fn default_max_rejections() -> u32 {
    5
}

/// Filter group settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FilterConfig {
    /// Ordered stage chain applied to every key
    #[serde(default = "default_filter_stages")]
    pub stages: Vec<FilterStageConfig>,

    /// Minimum interval between cull passes
    #[serde(default = "default_cull_period_ms")]
    #[validate(range(min = 1))]
    pub cull_period_ms: u64,

    /// Filters without data for longer than this are culled
    #[serde(default = "default_inactivity_timeout_ms")]
    #[validate(range(min = 1))]
    pub inactivity_timeout_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            stages: default_filter_stages(),
            cull_period_ms: default_cull_period_ms(),
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
        }
    }
}

fn default_filter_stages() -> Vec<FilterStageConfig> {
    vec![
        FilterStageConfig::AgeGate {
            min_samples: default_min_samples(),
            max_missing: default_max_missing(),
        },
        FilterStageConfig::Kalman {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
        },
    ]
}

fn default_cull_period_ms() -> u64 {
    1000
}

fn default_inactivity_timeout_ms() -> u64 {
    1000
}

/// Motion model of the synthetic source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionModel {
    /// Random walk
    #[default]
    Brownian,
    /// Random walk pulled back towards an anchor
    Elastic,
}

/// Synthetic "null" tracking system
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NullSourceConfig {
    #[serde(default = "default_null_fps")]
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub fps: f32,

    /// Number of synthetic trackables
    #[serde(default = "default_null_count")]
    #[validate(range(max = 10000))]
    pub count: usize,

    /// Half extent of the volume, meters
    #[serde(default = "default_bounds")]
    #[validate(range(exclusive_min = 0.0))]
    pub bounds: f32,

    #[serde(default)]
    pub motion: MotionModel,

    /// Meters per second
    #[serde(default = "default_speed")]
    #[validate(range(min = 0.0))]
    pub speed: f32,

    /// Probability a trackable is present in a tick
    #[serde(default = "default_presence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub presence_density: f32,

    #[serde(default = "default_true")]
    pub set_id: bool,

    #[serde(default)]
    pub set_cuid: bool,

    /// Also emit one observer frame per tick
    #[serde(default)]
    pub observers: usize,

    /// Deterministic generator seed
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for NullSourceConfig {
    fn default() -> Self {
        Self {
            fps: default_null_fps(),
            count: default_null_count(),
            bounds: default_bounds(),
            motion: MotionModel::default(),
            speed: default_speed(),
            presence_density: default_presence(),
            set_id: true,
            set_cuid: false,
            observers: 0,
            seed: None,
        }
    }
}

fn default_null_fps() -> f32 {
    30.0
}

fn default_null_count() -> usize {
    4
}

fn default_bounds() -> f32 {
    2.0
}

fn default_speed() -> f32 {
    0.5
}

fn default_presence() -> f32 {
    1.0
}

/// Take writer settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecorderConfig {
    #[serde(default = "default_take_folder")]
    pub take_folder: PathBuf,

    #[serde(default = "default_take_prefix")]
    #[validate(length(min = 1))]
    pub take_prefix: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            take_folder: default_take_folder(),
            take_prefix: default_take_prefix(),
        }
    }
}

fn default_take_folder() -> PathBuf {
    PathBuf::from("takes")
}

fn default_take_prefix() -> String {
    "take".to_string()
}

/// Take player settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlaybackConfig {
    /// Take loaded at startup
    #[serde(default)]
    pub take_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub loop_playback: bool,

    /// Playback speed multiplier
    #[serde(default = "default_speed_multiplier")]
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub speed: f32,

    /// Start playing as soon as a take is loaded
    #[serde(default)]
    pub autoplay: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            take_path: None,
            loop_playback: true,
            speed: default_speed_multiplier(),
            autoplay: false,
        }
    }
}

fn default_speed_multiplier() -> f32 {
    1.0
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Type specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON lines file
    File,
    /// UDP datagrams
    Network,
}
