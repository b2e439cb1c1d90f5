//! Comparison of found matrices with injected misalignments.
//!
//! Only meaningful on simulated data, where the true misalignment of every
//! sensor is known. Deviations are reported in µm and µrad assuming cm
//! input.

use std::collections::BTreeMap;

use lmd_core::{
    invert_rigid, pose_delta, rebase_to_global, DetectorLayout, Mat4, OverlapId, Real, SensorId,
};
use serde::Serialize;

use crate::tables::IdealGeometry;

const CM_TO_UM: Real = 1e4;
const RAD_TO_URAD: Real = 1e6;

/// Overlap matrix a perfect fit would find for sensors A and B:
/// `(M_A^g)⁻¹ · M_B^g`, with `M^g = G · M · G⁻¹`.
pub fn expected_overlap_matrix(ideal_a: &Mat4, ideal_b: &Mat4, mis_a: &Mat4, mis_b: &Mat4) -> Mat4 {
    let global_a = rebase_to_global(mis_a, ideal_a);
    let global_b = rebase_to_global(mis_b, ideal_b);
    invert_rigid(&global_a) * global_b
}

/// Expected overlap matrices for every overlap whose sensors have both an
/// ideal and an injected matrix.
pub fn expected_overlap_matrices(
    layout: &DetectorLayout,
    ideal: &IdealGeometry,
    misalignments: &BTreeMap<SensorId, Mat4>,
) -> BTreeMap<OverlapId, Mat4> {
    layout
        .modules()
        .flat_map(|m| m.overlaps.iter())
        .filter_map(|info| {
            let matrix = expected_overlap_matrix(
                ideal.get(&info.first)?,
                ideal.get(&info.second)?,
                misalignments.get(&info.first)?,
                misalignments.get(&info.second)?,
            );
            Some((info.id, matrix))
        })
        .collect()
}

/// Deviation of one found matrix from its reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deviation<K> {
    pub key: K,
    /// `(reference − found)[0][3]` in µm.
    pub dx_um: Real,
    /// `(reference − found)[1][3]` in µm.
    pub dy_um: Real,
    /// Rotation angle of `reference⁻¹ · found` in µrad.
    pub rotation_urad: Real,
}

/// Mean and population standard deviation of the in-plane deviations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeviationSummary {
    pub count: usize,
    pub mean_dx_um: Real,
    pub std_dx_um: Real,
    pub mean_dy_um: Real,
    pub std_dy_um: Real,
    pub max_rotation_urad: Real,
}

impl DeviationSummary {
    pub fn from_deviations<K>(deviations: &[Deviation<K>]) -> Self {
        if deviations.is_empty() {
            return Self::default();
        }
        let dx: Vec<Real> = deviations.iter().map(|d| d.dx_um).collect();
        let dy: Vec<Real> = deviations.iter().map(|d| d.dy_um).collect();
        let (mean_dx_um, std_dx_um) = mean_std(&dx);
        let (mean_dy_um, std_dy_um) = mean_std(&dy);
        Self {
            count: deviations.len(),
            mean_dx_um,
            std_dx_um,
            mean_dy_um,
            std_dy_um,
            max_rotation_urad: deviations
                .iter()
                .map(|d| d.rotation_urad)
                .fold(0.0, Real::max),
        }
    }
}

fn mean_std(values: &[Real]) -> (Real, Real) {
    let n = values.len() as Real;
    let mean = values.iter().sum::<Real>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<Real>() / n;
    (mean, var.sqrt())
}

/// Per-item deviations plus the keys that had no found matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison<K> {
    pub deviations: Vec<Deviation<K>>,
    /// Reference keys without a found matrix.
    pub missing: Vec<K>,
    pub summary: DeviationSummary,
}

fn compare<K: Ord + Copy>(
    found: &BTreeMap<K, Mat4>,
    reference: &BTreeMap<K, Mat4>,
) -> Comparison<K> {
    let mut deviations = Vec::new();
    let mut missing = Vec::new();
    for (key, expected) in reference {
        let Some(actual) = found.get(key) else {
            missing.push(*key);
            continue;
        };
        let diff = expected - actual;
        deviations.push(Deviation {
            key: *key,
            dx_um: diff[(0, 3)] * CM_TO_UM,
            dy_um: diff[(1, 3)] * CM_TO_UM,
            rotation_urad: pose_delta(expected, actual).rotation * RAD_TO_URAD,
        });
    }
    let summary = DeviationSummary::from_deviations(&deviations);
    Comparison {
        deviations,
        missing,
        summary,
    }
}

/// Compare found overlap matrices with expected ones.
pub fn compare_overlaps(
    found: &BTreeMap<OverlapId, Mat4>,
    expected: &BTreeMap<OverlapId, Mat4>,
) -> Comparison<OverlapId> {
    compare(found, expected)
}

/// Compare combined sensor misalignments with injected ones.
pub fn compare_alignment(
    found: &BTreeMap<SensorId, Mat4>,
    injected: &BTreeMap<SensorId, Mat4>,
) -> Comparison<SensorId> {
    compare(found, injected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmd_core::{rotation_z, translation_matrix, ModuleId, Vec3};

    #[test]
    fn offsets_are_reported_in_micrometres() {
        let module = ModuleId::new(0, 0, 0);
        let (a, b) = (module.sensor(0), module.sensor(1));
        let injected = BTreeMap::from([
            (a, translation_matrix(&Vec3::new(0.001, 0.0, 0.0))),
            (b, rotation_z(2e-6)),
        ]);
        let found = BTreeMap::from([(a, Mat4::identity())]);

        let cmp = compare_alignment(&found, &injected);
        assert_eq!(cmp.missing, vec![b]);
        assert_eq!(cmp.deviations.len(), 1);
        assert!((cmp.deviations[0].dx_um - 10.0).abs() < 1e-9);
        assert_eq!(cmp.deviations[0].dy_um, 0.0);
        assert_eq!(cmp.summary.count, 1);
        assert!((cmp.summary.mean_dx_um - 10.0).abs() < 1e-9);
        assert_eq!(cmp.summary.std_dx_um, 0.0);
    }

    #[test]
    fn expected_overlap_of_aligned_pair_is_identity() {
        let g_a = translation_matrix(&Vec3::new(1.0, 0.0, 1100.0));
        let g_b = translation_matrix(&Vec3::new(3.0, 1.0, 1100.5)) * rotation_z(0.7);
        let i = Mat4::identity();
        assert!((expected_overlap_matrix(&g_a, &g_b, &i, &i) - i).amax() < 1e-12);

        // same global shift on both sensors cancels out
        let shift = translation_matrix(&Vec3::new(0.01, 0.02, 0.0));
        let m_a = invert_rigid(&g_a) * shift * g_a;
        let m_b = invert_rigid(&g_b) * shift * g_b;
        assert!((expected_overlap_matrix(&g_a, &g_b, &m_a, &m_b) - i).amax() < 1e-9);
    }

    #[test]
    fn summary_statistics() {
        let devs: Vec<Deviation<u32>> = [1.0, 3.0]
            .iter()
            .enumerate()
            .map(|(i, &dx)| Deviation {
                key: i as u32,
                dx_um: dx,
                dy_um: -dx,
                rotation_urad: dx * 2.0,
            })
            .collect();
        let s = DeviationSummary::from_deviations(&devs);
        assert_eq!(s.mean_dx_um, 2.0);
        assert_eq!(s.std_dx_um, 1.0);
        assert_eq!(s.mean_dy_um, -2.0);
        assert_eq!(s.max_rotation_urad, 6.0);
    }
}
