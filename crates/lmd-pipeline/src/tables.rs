//! Read-only matrix tables keyed by sensor.

use std::collections::BTreeMap;

use lmd_core::{Mat4, ModuleId, SensorId};

/// Ideal (design) pose of every sensor in the global frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdealGeometry {
    poses: BTreeMap<SensorId, Mat4>,
}

impl IdealGeometry {
    pub fn new(poses: BTreeMap<SensorId, Mat4>) -> Self {
        Self { poses }
    }

    pub fn get(&self, sensor: &SensorId) -> Option<&Mat4> {
        self.poses.get(sensor)
    }

    pub fn insert(&mut self, sensor: SensorId, pose: Mat4) -> Option<Mat4> {
        self.poses.insert(sensor, pose)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SensorId, &Mat4)> {
        self.poses.iter()
    }
}

impl FromIterator<(SensorId, Mat4)> for IdealGeometry {
    fn from_iter<I: IntoIterator<Item = (SensorId, Mat4)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Externally measured misalignment matrices (sensor-local frame).
///
/// Each module needs at least its anchor sensor; further entries are used
/// as cross-checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorTable {
    matrices: BTreeMap<SensorId, Mat4>,
}

impl AnchorTable {
    pub fn new(matrices: BTreeMap<SensorId, Mat4>) -> Self {
        Self { matrices }
    }

    pub fn get(&self, sensor: &SensorId) -> Option<&Mat4> {
        self.matrices.get(sensor)
    }

    pub fn insert(&mut self, sensor: SensorId, matrix: Mat4) -> Option<Mat4> {
        self.matrices.insert(sensor, matrix)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Entries belonging to `module`.
    pub fn for_module(&self, module: ModuleId) -> impl Iterator<Item = (&SensorId, &Mat4)> {
        self.matrices
            .iter()
            .filter(move |(sensor, _)| sensor.module() == module)
    }
}

impl FromIterator<(SensorId, Mat4)> for AnchorTable {
    fn from_iter<I: IntoIterator<Item = (SensorId, Mat4)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
