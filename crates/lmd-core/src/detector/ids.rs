//! Typed addresses of detector components.
//!
//! Geometry paths such as
//! `/cave_1/lmd_root_0/half_0/plane_2/module_4/sensor_7` are only produced
//! and parsed here; the rest of the workspace works with [`SensorId`],
//! [`ModuleId`] and [`OverlapId`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of detector halves.
pub const HALVES: u8 = 2;
/// Number of planes (discs) per half.
pub const PLANES: u8 = 4;
/// Number of modules per plane.
pub const MODULES_PER_PLANE: u8 = 5;
/// Number of sensors carried by one module.
pub const SENSORS_PER_MODULE: u8 = 9;
/// Number of sensor overlaps on one module.
pub const OVERLAPS_PER_MODULE: u8 = 9;

const PATH_ROOT: &str = "/cave_1/lmd_root_0";

/// Errors raised while parsing geometry paths or overlap IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path does not have the expected number of segments.
    #[error("malformed detector path '{0}'")]
    Malformed(String),
    /// A segment does not carry the expected prefix or index.
    #[error("expected segment '{expected}_<n>' in path, found '{found}'")]
    UnexpectedSegment {
        /// Expected segment prefix.
        expected: &'static str,
        /// Segment found instead.
        found: String,
    },
    /// An overlap ID is not a valid integer.
    #[error("invalid overlap id '{0}'")]
    InvalidOverlapId(String),
}

/// A detector module: half, plane and module index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub half: u8,
    pub plane: u8,
    pub module: u8,
}

impl ModuleId {
    pub fn new(half: u8, plane: u8, module: u8) -> Self {
        Self {
            half,
            plane,
            module,
        }
    }

    /// Sensor `sensor` on this module.
    pub fn sensor(&self, sensor: u8) -> SensorId {
        SensorId::new(self.half, self.plane, self.module, sensor)
    }

    /// All modules of the reference geometry, ordered by half, plane, module.
    pub fn all() -> impl Iterator<Item = ModuleId> {
        (0..HALVES).flat_map(|half| {
            (0..PLANES).flat_map(move |plane| {
                (0..MODULES_PER_PLANE).map(move |module| ModuleId::new(half, plane, module))
            })
        })
    }

    /// Geometry path of the module.
    pub fn path(&self) -> String {
        format!(
            "{PATH_ROOT}/half_{}/plane_{}/module_{}",
            self.half, self.plane, self.module
        )
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for ModuleId {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = split_path(s, 5)?;
        let (half, plane, module) = parse_module_segments(&segments)?;
        Ok(ModuleId::new(half, plane, module))
    }
}

/// A single sensor: module address plus sensor index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId {
    pub half: u8,
    pub plane: u8,
    pub module: u8,
    pub sensor: u8,
}

impl SensorId {
    pub fn new(half: u8, plane: u8, module: u8, sensor: u8) -> Self {
        Self {
            half,
            plane,
            module,
            sensor,
        }
    }

    /// Module carrying this sensor.
    pub fn module(&self) -> ModuleId {
        ModuleId::new(self.half, self.plane, self.module)
    }

    /// Geometry path of the sensor.
    pub fn path(&self) -> String {
        format!("{}/sensor_{}", self.module().path(), self.sensor)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for SensorId {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = split_path(s, 6)?;
        let (half, plane, module) = parse_module_segments(&segments)?;
        let sensor = parse_segment(segments[5], "sensor")?;
        Ok(SensorId::new(half, plane, module, sensor))
    }
}

fn split_path(s: &str, expected: usize) -> Result<Vec<&str>, PathError> {
    let segments: Vec<&str> = s.trim().trim_start_matches('/').split('/').collect();
    if segments.len() != expected {
        return Err(PathError::Malformed(s.to_string()));
    }
    Ok(segments)
}

fn parse_module_segments(segments: &[&str]) -> Result<(u8, u8, u8), PathError> {
    parse_segment(segments[0], "cave")?;
    parse_segment(segments[1], "lmd_root")?;
    let half = parse_segment(segments[2], "half")?;
    let plane = parse_segment(segments[3], "plane")?;
    let module = parse_segment(segments[4], "module")?;
    Ok((half, plane, module))
}

fn parse_segment(segment: &str, prefix: &'static str) -> Result<u8, PathError> {
    segment
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|idx| idx.parse::<u8>().ok())
        .ok_or_else(|| PathError::UnexpectedSegment {
            expected: prefix,
            found: segment.to_string(),
        })
}

/// Identifier of one sensor-pair overlap region.
///
/// Encoded with fixed positional digits:
/// `half * 1000 + plane * 100 + module * 10 + local_overlap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlapId(pub u32);

impl OverlapId {
    pub fn new(half: u8, plane: u8, module: u8, local: u8) -> Self {
        OverlapId(
            u32::from(half) * 1000
                + u32::from(plane) * 100
                + u32::from(module) * 10
                + u32::from(local),
        )
    }

    fn digit(&self, n: u32) -> u8 {
        (self.0 / 10u32.pow(n) % 10) as u8
    }

    pub fn half(&self) -> u8 {
        self.digit(3)
    }

    pub fn plane(&self) -> u8 {
        self.digit(2)
    }

    pub fn module_index(&self) -> u8 {
        self.digit(1)
    }

    /// Index of the overlap within its module.
    pub fn local(&self) -> u8 {
        self.digit(0)
    }

    /// Module the overlap belongs to.
    pub fn module(&self) -> ModuleId {
        ModuleId::new(self.half(), self.plane(), self.module_index())
    }
}

impl fmt::Display for OverlapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OverlapId {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(OverlapId)
            .map_err(|_| PathError::InvalidOverlapId(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_path_round_trip() {
        let id = SensorId::new(1, 2, 4, 7);
        let path = id.path();
        assert_eq!(path, "/cave_1/lmd_root_0/half_1/plane_2/module_4/sensor_7");
        assert_eq!(path.parse::<SensorId>().unwrap(), id);
        assert_eq!(id.module().path().parse::<ModuleId>().unwrap(), id.module());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(matches!(
            "/cave_1/lmd_root_0/half_0/plane_0".parse::<SensorId>(),
            Err(PathError::Malformed(_))
        ));
        assert!(matches!(
            "/cave_1/lmd_root_0/half_0/plane_0/module_0/sensorX".parse::<SensorId>(),
            Err(PathError::UnexpectedSegment {
                expected: "sensor",
                ..
            })
        ));
        assert!(matches!(
            "/cave_1/lmd_root_0/half_0/disc_0/module_0".parse::<ModuleId>(),
            Err(PathError::UnexpectedSegment {
                expected: "plane",
                ..
            })
        ));
    }

    #[test]
    fn overlap_id_digits() {
        let id = OverlapId::new(1, 3, 4, 8);
        assert_eq!(id.0, 1348);
        assert_eq!(id.half(), 1);
        assert_eq!(id.plane(), 3);
        assert_eq!(id.module_index(), 4);
        assert_eq!(id.local(), 8);
        assert_eq!(id.module(), ModuleId::new(1, 3, 4));
        assert_eq!("1348".parse::<OverlapId>().unwrap(), id);
        assert!("13x8".parse::<OverlapId>().is_err());
    }

    #[test]
    fn reference_module_count() {
        assert_eq!(ModuleId::all().count(), 40);
        assert_eq!(ModuleId::all().next(), Some(ModuleId::new(0, 0, 0)));
    }
}
