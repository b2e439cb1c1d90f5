//! Reference sensor poses and random planar misalignments.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    detector::{ModuleId, ModuleLayout, OverlapId, OverlapInfo, SensorId},
    math::{
        invert_rigid, rebase_to_global, rotation_z, translation, translation_matrix, Mat4, Pt3,
        Real, Vec3,
    },
    pairs::HitPairs,
};

use super::hits::{hit_pairs, HitOptions};

/// z position of plane 0 (cm).
const PLANE_Z0: Real = 1109.0;
/// Distance between consecutive planes (cm).
const PLANE_SPACING: Real = 10.0;
/// Distance of a module center from the beam axis (cm).
const MODULE_RADIUS: Real = 11.0;

/// Sensor placement inside its module frame: `(x, y, z, angle)`.
/// Sensors 0..=4 sit on the front side, 5..=8 on the back side.
const SENSOR_OFFSETS: [(Real, Real, Real, Real); 9] = [
    (-2.4, 1.8, -0.5, 0.0),
    (0.0, 1.8, -0.5, 0.0),
    (2.4, 1.8, -0.5, 0.0),
    (-1.2, -0.4, -0.5, PI),
    (1.2, -0.4, -0.5, PI),
    (-1.2, 1.8, 0.5, 0.5 * PI),
    (1.2, 1.8, 0.5, 0.5 * PI),
    (-2.4, -0.4, 0.5, -0.5 * PI),
    (2.4, -0.4, 0.5, -0.5 * PI),
];

/// Ideal pose of a module frame in the global frame.
pub fn module_ideal_pose(module: ModuleId) -> Mat4 {
    let z = PLANE_Z0 + PLANE_SPACING * Real::from(module.plane);
    let angle = Real::from(module.half) * PI + (Real::from(module.module) + 0.5) * PI / 5.0;
    translation_matrix(&Vec3::new(0.0, 0.0, z))
        * rotation_z(angle)
        * translation_matrix(&Vec3::new(MODULE_RADIUS, 0.0, 0.0))
}

/// Ideal pose of a sensor in the global frame.
///
/// Sensor indices beyond the reference layout reuse the offsets modulo 9.
pub fn sensor_ideal_pose(sensor: SensorId) -> Mat4 {
    let (x, y, z, angle) = SENSOR_OFFSETS[usize::from(sensor.sensor) % SENSOR_OFFSETS.len()];
    module_ideal_pose(sensor.module())
        * translation_matrix(&Vec3::new(x, y, z))
        * rotation_z(angle)
}

/// Ideal poses of all nine sensors of `module`.
pub fn module_ideal_poses(module: ModuleId) -> BTreeMap<SensorId, Mat4> {
    (0..SENSOR_OFFSETS.len() as u8)
        .map(|s| {
            let sensor = module.sensor(s);
            (sensor, sensor_ideal_pose(sensor))
        })
        .collect()
}

/// Bounds for random planar misalignments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MisalignmentRange {
    /// Maximum absolute rotation about the sensor's z axis (rad).
    pub max_angle: Real,
    /// Maximum absolute in-plane shift per axis (cm).
    pub max_shift: Real,
}

impl Default for MisalignmentRange {
    fn default() -> Self {
        Self {
            max_angle: 2e-3,
            max_shift: 0.02,
        }
    }
}

/// Draw one planar misalignment in the sensor's own frame.
pub fn random_misalignment<R: Rng>(rng: &mut R, range: &MisalignmentRange) -> Mat4 {
    let angle = symmetric(rng, range.max_angle);
    let dx = symmetric(rng, range.max_shift);
    let dy = symmetric(rng, range.max_shift);
    translation_matrix(&Vec3::new(dx, dy, 0.0)) * rotation_z(angle)
}

/// Seeded planar misalignments for every sensor of `layout`, in ascending
/// sensor order.
pub fn random_misalignments(
    layout: &ModuleLayout,
    range: &MisalignmentRange,
    seed: u64,
) -> BTreeMap<SensorId, Mat4> {
    let mut rng = StdRng::seed_from_u64(seed);
    layout
        .sensors
        .iter()
        .map(|&s| (s, random_misalignment(&mut rng, range)))
        .collect()
}

pub(super) fn symmetric<R: Rng>(rng: &mut R, bound: Real) -> Real {
    let bound = bound.abs();
    if bound == 0.0 {
        return 0.0;
    }
    rng.random_range(-bound..=bound)
}

/// A module with known ideal geometry and injected misalignments.
///
/// Sensors missing from `ideal` or `misalignments` are treated as sitting at
/// the global origin or as perfectly aligned respectively.
#[derive(Debug, Clone)]
pub struct SyntheticModule {
    pub layout: ModuleLayout,
    /// Ideal sensor poses `G_S`.
    pub ideal: BTreeMap<SensorId, Mat4>,
    /// Misalignments `M_S` in each sensor's own frame.
    pub misalignments: BTreeMap<SensorId, Mat4>,
}

impl SyntheticModule {
    /// Reference module with seeded random misalignments.
    pub fn reference(module: ModuleId, range: &MisalignmentRange, seed: u64) -> Self {
        let layout = ModuleLayout::reference(module);
        let misalignments = random_misalignments(&layout, range, seed);
        Self {
            layout,
            ideal: module_ideal_poses(module),
            misalignments,
        }
    }

    /// Reference module without misalignments.
    pub fn aligned(module: ModuleId) -> Self {
        let layout = ModuleLayout::reference(module);
        let misalignments = layout.sensors.iter().map(|&s| (s, Mat4::identity())).collect();
        Self {
            layout,
            ideal: module_ideal_poses(module),
            misalignments,
        }
    }

    pub fn ideal_pose(&self, sensor: SensorId) -> Mat4 {
        self.ideal.get(&sensor).copied().unwrap_or_else(Mat4::identity)
    }

    pub fn misalignment(&self, sensor: SensorId) -> Mat4 {
        self.misalignments
            .get(&sensor)
            .copied()
            .unwrap_or_else(Mat4::identity)
    }

    /// Misalignment of `sensor` expressed in the global frame: `G M G⁻¹`.
    pub fn global_misalignment(&self, sensor: SensorId) -> Mat4 {
        rebase_to_global(&self.misalignment(sensor), &self.ideal_pose(sensor))
    }

    /// Actual pose `G · M` of `sensor`.
    pub fn actual_pose(&self, sensor: SensorId) -> Mat4 {
        self.ideal_pose(sensor) * self.misalignment(sensor)
    }

    /// Overlap matrix a perfect fit would return for `info`:
    /// `(M_first^g)⁻¹ · M_second^g`.
    pub fn true_overlap_matrix(&self, info: &OverlapInfo) -> Mat4 {
        invert_rigid(&self.global_misalignment(info.first)) * self.global_misalignment(info.second)
    }

    /// Hit pairs for one overlap, centered between the two sensors.
    pub fn hit_pairs(&self, info: &OverlapInfo, options: &HitOptions) -> HitPairs {
        let a = translation(&self.ideal_pose(info.first));
        let b = translation(&self.ideal_pose(info.second));
        let center = Pt3::from((a + b) * 0.5);
        hit_pairs(
            &self.global_misalignment(info.first),
            &self.global_misalignment(info.second),
            &center,
            options,
            overlap_seed(options.seed, info.id),
        )
    }

    /// Hit pairs for every overlap of the module.
    pub fn all_hit_pairs(&self, options: &HitOptions) -> BTreeMap<OverlapId, HitPairs> {
        self.layout
            .overlaps
            .iter()
            .map(|info| (info.id, self.hit_pairs(info, options)))
            .collect()
    }
}

fn overlap_seed(seed: u64, id: OverlapId) -> u64 {
    seed ^ u64::from(id.0).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{is_rigid, pose_delta};

    #[test]
    fn ideal_poses_are_rigid_and_distinct() {
        let poses = module_ideal_poses(ModuleId::new(1, 3, 4));
        assert_eq!(poses.len(), 9);
        for pose in poses.values() {
            assert!(is_rigid(pose, 1e-12));
        }
        let s0 = poses[&SensorId::new(1, 3, 4, 0)];
        let s1 = poses[&SensorId::new(1, 3, 4, 1)];
        assert!(pose_delta(&s0, &s1).translation > 1.0);
        assert!((translation(&s0).z - (PLANE_Z0 + 3.0 * PLANE_SPACING - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn misalignments_are_seeded_and_bounded() {
        let layout = ModuleLayout::reference(ModuleId::new(0, 0, 0));
        let range = MisalignmentRange::default();
        let a = random_misalignments(&layout, &range, 42);
        let b = random_misalignments(&layout, &range, 42);
        let c = random_misalignments(&layout, &range, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);

        for m in a.values() {
            assert!(is_rigid(m, 1e-12));
            assert_eq!(m[(2, 3)], 0.0);
            assert!(m[(0, 3)].abs() <= range.max_shift);
            assert!(pose_delta(&Mat4::identity(), m).rotation <= range.max_angle + 1e-12);
        }
    }

    #[test]
    fn actual_pose_equals_global_misalignment_of_ideal() {
        let range = MisalignmentRange::default();
        let module = SyntheticModule::reference(ModuleId::new(0, 2, 1), &range, 5);
        let s = module.layout.module.sensor(6);
        let lhs = module.actual_pose(s);
        let rhs = module.global_misalignment(s) * module.ideal_pose(s);
        assert!((lhs - rhs).amax() < 1e-9);
    }
}
