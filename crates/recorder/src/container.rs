//! Point-track container (`.c3d` takes)
//!
//! A fixed header declaring every point label and its JSON description,
//! followed by one frame per recorded tick holding one position per label.
//! Absent points are stored as NaN.
//!
//! Layout (little-endian):
//!
//! ```text
//! magic        8 bytes  "RTLSC3D\0"
//! version      u16
//! rate         f32      POINT:RATE
//! scale        f32      POINT:SCALE
//! units        str      POINT:UNITS
//! parameters   u32 n, then n x (group str, name str, value str)
//! labels       u32 n, then n x str
//! descriptions n x str  (same count as labels)
//! frames       u32 m, then m x n x (f32 x, f32 y, f32 z)
//! ```
//!
//! `str` is a u32 byte length followed by UTF-8.
//!
//! This is the server's own format. It borrows the C3D point/label model and
//! the `.c3d` extension but is not readable by C3D tools.

use std::fs;
use std::io::Write;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::Position;
use tracing::{debug, instrument};

use crate::error::ContainerError;

const MAGIC: &[u8; 8] = b"RTLSC3D\0";
const VERSION: u16 = 1;

/// Free-form `GROUP:NAME = value` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub group: String,
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(group: &str, name: &str, value: impl Into<String>) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// In-memory take container
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub rate: f32,
    pub scale: f32,
    pub units: String,
    pub parameters: Vec<Parameter>,
    pub labels: Vec<String>,
    pub descriptions: Vec<String>,
    /// One entry per tick, each with `labels.len()` positions
    pub frames: Vec<Vec<Position>>,
}

impl Container {
    /// Empty container at `rate` with metric units
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            scale: -1.0,
            units: "m".to_string(),
            parameters: Vec::new(),
            labels: Vec::new(),
            descriptions: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.labels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Take length in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.rate > 0.0 {
            self.frames.len() as f32 / self.rate
        } else {
            0.0
        }
    }

    pub fn parameter(&self, group: &str, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.group == group && p.name == name)
            .map(|p| p.value.as_str())
    }

    fn check(&self) -> Result<(), ContainerError> {
        if self.descriptions.len() != self.labels.len() {
            return Err(ContainerError::inconsistent(format!(
                "{} labels but {} descriptions",
                self.labels.len(),
                self.descriptions.len()
            )));
        }
        if let Some((index, frame)) = self
            .frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != self.labels.len())
        {
            return Err(ContainerError::inconsistent(format!(
                "frame {} has {} points, expected {}",
                index,
                frame.len(),
                self.labels.len()
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes, ContainerError> {
        self.check()?;

        let points = self.labels.len();
        let mut buf = BytesMut::with_capacity(64 + self.frames.len() * points * 12);
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_f32_le(self.rate);
        buf.put_f32_le(self.scale);
        put_str(&mut buf, &self.units);

        buf.put_u32_le(len_u32(self.parameters.len()));
        for p in &self.parameters {
            put_str(&mut buf, &p.group);
            put_str(&mut buf, &p.name);
            put_str(&mut buf, &p.value);
        }

        buf.put_u32_le(len_u32(points));
        for label in &self.labels {
            put_str(&mut buf, label);
        }
        for description in &self.descriptions {
            put_str(&mut buf, description);
        }

        buf.put_u32_le(len_u32(self.frames.len()));
        for frame in &self.frames {
            for p in frame {
                buf.put_f32_le(p.x);
                buf.put_f32_le(p.y);
                buf.put_f32_le(p.z);
            }
        }

        Ok(buf.freeze())
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, ContainerError> {
        need(&buf, MAGIC.len(), "magic")?;
        if &buf.split_to(MAGIC.len())[..] != MAGIC {
            return Err(ContainerError::BadMagic);
        }
        need(&buf, 2 + 4 + 4, "header")?;
        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(ContainerError::UnsupportedVersion { version });
        }
        let rate = buf.get_f32_le();
        let scale = buf.get_f32_le();
        let units = get_str(&mut buf, "units")?;

        let count = get_count(&mut buf, "parameters")?;
        let mut parameters = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let group = get_str(&mut buf, "parameter group")?;
            let name = get_str(&mut buf, "parameter name")?;
            let value = get_str(&mut buf, "parameter value")?;
            parameters.push(Parameter { group, name, value });
        }

        let points = get_count(&mut buf, "labels")?;
        let mut labels = Vec::with_capacity(points.min(4096));
        for _ in 0..points {
            labels.push(get_str(&mut buf, "label")?);
        }
        let mut descriptions = Vec::with_capacity(points.min(4096));
        for _ in 0..points {
            descriptions.push(get_str(&mut buf, "description")?);
        }

        let frame_count = get_count(&mut buf, "frames")?;
        if frame_count > 0 && points == 0 {
            return Err(ContainerError::inconsistent(format!(
                "{frame_count} frames declared without any points"
            )));
        }
        need(&buf, frame_count.saturating_mul(points).saturating_mul(12), "frames")?;
        if buf.has_remaining() {
            return Err(ContainerError::inconsistent(format!(
                "{} trailing bytes after {frame_count} frames of {points} points",
                buf.remaining()
            )));
        }
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let frame = (0..points)
                .map(|_| {
                    let x = buf.get_f32_le();
                    let y = buf.get_f32_le();
                    let z = buf.get_f32_le();
                    Position::new(x, y, z)
                })
                .collect();
            frames.push(frame);
        }

        Ok(Self {
            rate,
            scale,
            units,
            parameters,
            labels,
            descriptions,
            frames,
        })
    }

    /// Write to `path` through a temporary sibling file so that a failed
    /// write never leaves a partial take at `path`.
    #[instrument(name = "container_write", skip(self), fields(path = %path.display()))]
    pub fn write(&self, path: &Path) -> Result<(), ContainerError> {
        let data = self.encode()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ContainerError::io(parent, e))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".part");
        let tmp = Path::new(&tmp_name);

        let result = fs::File::create(tmp)
            .and_then(|mut file| {
                file.write_all(&data)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(tmp, path));

        if let Err(e) = result {
            let _ = fs::remove_file(tmp);
            return Err(ContainerError::io(path, e));
        }

        debug!(bytes = data.len(), frames = self.frames.len(), "container written");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, ContainerError> {
        let data = fs::read(path).map_err(|e| ContainerError::io(path, e))?;
        Self::decode(Bytes::from(data))
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(len_u32(s.len()));
    buf.put_slice(s.as_bytes());
}

fn need(buf: &Bytes, n: usize, what: &'static str) -> Result<(), ContainerError> {
    if buf.remaining() < n {
        Err(ContainerError::Truncated { what })
    } else {
        Ok(())
    }
}

fn get_count(buf: &mut Bytes, what: &'static str) -> Result<usize, ContainerError> {
    need(buf, 4, what)?;
    Ok(buf.get_u32_le() as usize)
}

fn get_str(buf: &mut Bytes, what: &'static str) -> Result<String, ContainerError> {
    let len = get_count(buf, what)?;
    need(buf, len, what)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ContainerError::InvalidText { what })
}
