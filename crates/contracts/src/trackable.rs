//! Trackable / Frame - canonical unit of transport
//!
//! A `Frame` is the only thing that flows between sources, postprocessors,
//! the recorder and output consumers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 3D position in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// True if any component is NaN (the container's "no data" sentinel)
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Position {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Unit quaternion orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

/// One tracked point or body in one frame.
///
/// Identity fields follow these conventions:
/// - `id == 0` means the field is unset
/// - `id < 0` flags the trackable as unidentifiable
/// - empty `cuid` / `name` mean unset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trackable {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub cuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub context: String,
    pub position: Position,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

impl Trackable {
    /// Trackable with only a position
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_cuid(mut self, cuid: impl Into<String>) -> Self {
        self.cuid = cuid.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Ordered set of trackables captured at one instant by one source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonically increasing per-source sequence number
    pub frame_id: u64,
    /// Capture timestamp, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// JSON context tag, see [`FrameContext`]
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub trackables: Vec<Trackable>,
}

impl Frame {
    pub fn new(trackables: Vec<Trackable>) -> Self {
        Self {
            trackables,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.trackables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackables.is_empty()
    }

    /// Parsed (system, trackable type) tag, if the context carries one
    pub fn tag(&self) -> Option<FrameContext> {
        FrameContext::parse(&self.context)
    }
}

/// Tracking system that produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    Invalid,
    Null,
    #[serde(rename = "openvr")]
    OpenVr,
    Motive,
}

impl SystemType {
    /// All real (non-invalid) systems
    pub const ALL: [SystemType; 3] = [SystemType::Null, SystemType::OpenVr, SystemType::Motive];

    /// Numeric code carried in frame context (`"s"`)
    pub fn code(self) -> i32 {
        match self {
            SystemType::Invalid => -1,
            SystemType::Null => 0,
            SystemType::OpenVr => 1,
            SystemType::Motive => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => SystemType::Null,
            1 => SystemType::OpenVr,
            2 => SystemType::Motive,
            _ => SystemType::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemType::Invalid => "invalid",
            SystemType::Null => "null",
            SystemType::OpenVr => "openvr",
            SystemType::Motive => "motive",
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "null" => Ok(SystemType::Null),
            "openvr" | "open_vr" => Ok(SystemType::OpenVr),
            "motive" => Ok(SystemType::Motive),
            other => Err(format!("unknown tracking system '{other}'")),
        }
    }
}

/// Kind of trackable carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackableType {
    Invalid,
    /// Marker samples
    Sample,
    /// Observers (cameras, base stations)
    Observer,
}

impl TrackableType {
    pub const ALL: [TrackableType; 2] = [TrackableType::Sample, TrackableType::Observer];

    /// Numeric code carried in frame context (`"t"`)
    pub fn code(self) -> i32 {
        match self {
            TrackableType::Invalid => -1,
            TrackableType::Sample => 0,
            TrackableType::Observer => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TrackableType::Sample,
            1 => TrackableType::Observer,
            _ => TrackableType::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackableType::Invalid => "invalid",
            TrackableType::Sample => "sample",
            TrackableType::Observer => "observer",
        }
    }
}

impl fmt::Display for TrackableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" | "samples" => Ok(TrackableType::Sample),
            "observer" | "observers" => Ok(TrackableType::Observer),
            other => Err(format!("unknown trackable type '{other}'")),
        }
    }
}

/// (system, trackable type) discriminants stored in `Frame::context`
/// as `{"s": <system code>, "t": <type code>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameContext {
    pub system: SystemType,
    pub trackable_type: TrackableType,
}

impl FrameContext {
    pub fn new(system: SystemType, trackable_type: TrackableType) -> Self {
        Self {
            system,
            trackable_type,
        }
    }

    /// Parse a context string; `None` unless both `s` and `t` are present.
    pub fn parse(context: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(context).ok()?;
        Self::from_value(&value)
    }

    /// Read `s` / `t` out of a JSON object
    pub fn from_value(value: &Value) -> Option<Self> {
        let s = value.get("s")?.as_i64()?;
        let t = value.get("t")?.as_i64()?;
        Some(Self::new(SystemType::from_code(s), TrackableType::from_code(t)))
    }

    pub fn to_value(self) -> Value {
        let mut map = Map::new();
        map.insert("s".into(), Value::from(self.system.code()));
        map.insert("t".into(), Value::from(self.trackable_type.code()));
        Value::Object(map)
    }

    /// Merge the tag into an existing context string.
    ///
    /// Keys of an existing JSON object context are preserved; anything
    /// that is not a JSON object is replaced.
    pub fn merge_into(self, existing: &str) -> String {
        let mut map = match serde_json::from_str::<Value>(existing) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert("s".into(), Value::from(self.system.code()));
        map.insert("t".into(), Value::from(self.trackable_type.code()));
        Value::Object(map).to_string()
    }
}

impl fmt::Display for FrameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system, self.trackable_type)
    }
}
