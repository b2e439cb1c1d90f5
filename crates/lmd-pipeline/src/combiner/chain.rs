//! Relative-pose algebra between sensors of one module.
//!
//! `total(A→B)` denotes the actual pose of sensor B seen from sensor A's
//! actual frame, `P_A⁻¹ · P_B`. It is built from the ideal poses and the
//! measured global-frame overlap matrix of the pair.

use lmd_core::{base_transform, invert_rigid, Mat4};

/// Ideal transform from A to B expressed in A's frame:
/// `G_A⁻¹ · (G_B · G_A⁻¹) · G_A`.
pub fn ideal_relative_in_a(ideal_a: &Mat4, ideal_b: &Mat4) -> Mat4 {
    let ideal_local = ideal_b * invert_rigid(ideal_a);
    base_transform(&ideal_local, ideal_a)
}

/// `total(A→B)` from the measured overlap matrix `overlap` (global frame,
/// `M_B^g = M_A^g · overlap`).
///
/// The measured matrix has to be moved into A's frame before it can be
/// composed with the ideal relative transform.
pub fn overlap_total(overlap: &Mat4, ideal_a: &Mat4, ideal_b: &Mat4) -> Mat4 {
    base_transform(overlap, ideal_a) * ideal_relative_in_a(ideal_a, ideal_b)
}

/// Bridge A and B through a common partner C.
///
/// `a_to_c` is `total(A→C)` and `b_to_c` is `total(B→C)`. The latter is
/// re-expressed in A's frame as `a_to_c · b_to_c · a_to_c⁻¹`; its inverse
/// then composes with `a_to_c` to give `total(A→B)`.
pub fn chain_via(a_to_c: &Mat4, b_to_c: &Mat4) -> Mat4 {
    let b_to_c_in_a = a_to_c * b_to_c * invert_rigid(a_to_c);
    invert_rigid(&b_to_c_in_a) * a_to_c
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmd_core::{rotation_z, translation_matrix, Vec3};

    fn pose(x: f64, y: f64, angle: f64) -> Mat4 {
        translation_matrix(&Vec3::new(x, y, 1100.0)) * rotation_z(angle)
    }

    #[test]
    fn overlap_total_is_actual_relative_pose() {
        let (g_a, g_b) = (pose(1.0, 2.0, 0.3), pose(4.0, -1.0, 1.2));
        let (m_a, m_b) = (
            translation_matrix(&Vec3::new(0.01, -0.02, 0.0)) * rotation_z(1e-3),
            rotation_z(-2e-3),
        );
        let global_a = g_a * m_a * invert_rigid(&g_a);
        let global_b = g_b * m_b * invert_rigid(&g_b);
        let overlap = invert_rigid(&global_a) * global_b;

        let total = overlap_total(&overlap, &g_a, &g_b);
        let actual = invert_rigid(&(g_a * m_a)) * (g_b * m_b);
        assert!((total - actual).amax() < 1e-9);
    }

    #[test]
    fn chaining_matches_direct_composition() {
        let a_to_c = pose(3.0, 0.5, 0.4);
        let b_to_c = pose(-1.0, 2.0, -0.7);
        let expected = a_to_c * invert_rigid(&b_to_c);
        assert!((chain_via(&a_to_c, &b_to_c) - expected).amax() < 1e-9);
    }

    #[test]
    fn aligned_sensors_give_ideal_relative_pose() {
        let (g_a, g_b) = (pose(0.0, 0.0, 0.0), pose(2.4, 0.0, 0.5));
        let total = overlap_total(&Mat4::identity(), &g_a, &g_b);
        assert!((total - invert_rigid(&g_a) * g_b).amax() < 1e-12);
    }
}
