//! Helpers for 4×4 homogeneous rigid transforms.
//!
//! All matrices handled here are assumed to be rigid: an orthonormal
//! rotation block with determinant +1, a translation column and a last row
//! of `[0, 0, 0, 1]`. Use [`is_rigid`] to validate data coming from outside
//! the workspace before relying on [`invert_rigid`].

use nalgebra::{Matrix3, Rotation3, Vector3};
use thiserror::Error;

use super::{Mat2, Mat4, Real, Vec2, Vec3};

/// A 4×4 matrix flattened in row-major order, as exchanged at I/O boundaries.
pub type FlatMatrix = [Real; 16];

/// Tolerance applied to the last row when reading flattened matrices.
const HOMOGENEOUS_EPS: Real = 1e-9;

/// Errors raised when converting flattened matrices.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    /// The flattened matrix does not have 16 entries.
    #[error("expected 16 matrix entries, got {0}")]
    WrongLength(usize),
    /// The last row is not `[0, 0, 0, 1]`.
    #[error("last row of homogeneous matrix must be [0, 0, 0, 1]")]
    NotHomogeneous,
}

/// Build a 4×4 matrix from 16 row-major values.
pub fn mat4_from_row_major(values: &[Real]) -> Result<Mat4, MatrixError> {
    if values.len() != 16 {
        return Err(MatrixError::WrongLength(values.len()));
    }

    let last_row = &values[12..];
    let expected = [0.0, 0.0, 0.0, 1.0];
    if last_row
        .iter()
        .zip(expected.iter())
        .any(|(v, e)| (v - e).abs() > HOMOGENEOUS_EPS)
    {
        return Err(MatrixError::NotHomogeneous);
    }

    Ok(Mat4::from_row_slice(values))
}

/// Flatten a 4×4 matrix into 16 row-major values.
pub fn mat4_to_row_major(mat: &Mat4) -> FlatMatrix {
    let mut out = [0.0; 16];
    for r in 0..4 {
        for c in 0..4 {
            out[4 * r + c] = mat[(r, c)];
        }
    }
    out
}

/// Closed-form inverse of a rigid transform: `[Rᵀ | -Rᵀ t]`.
pub fn invert_rigid(mat: &Mat4) -> Mat4 {
    let rot_t: Matrix3<Real> = mat.fixed_view::<3, 3>(0, 0).transpose();
    let t: Vector3<Real> = mat.fixed_view::<3, 1>(0, 3).into_owned();
    let t_inv = -(rot_t * t);

    let mut out = Mat4::identity();
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot_t);
    out.fixed_view_mut::<3, 1>(0, 3).copy_from(&t_inv);
    out
}

/// Re-express a transform in another frame: `frame⁻¹ · mat · frame`.
///
/// `frame` is the pose of the target frame in the frame `mat` is currently
/// expressed in. Passing a sensor's ideal matrix turns a global-frame
/// transform into the same transform seen from that sensor.
pub fn base_transform(mat: &Mat4, frame: &Mat4) -> Mat4 {
    invert_rigid(frame) * mat * frame
}

/// Inverse of [`base_transform`]: `frame · mat · frame⁻¹`.
///
/// Turns a transform expressed in the frame whose pose is `frame` back into
/// the enclosing (usually global) frame.
pub fn rebase_to_global(mat: &Mat4, frame: &Mat4) -> Mat4 {
    frame * mat * invert_rigid(frame)
}

/// Check that `mat` is a proper rigid transform within `tol`.
pub fn is_rigid(mat: &Mat4, tol: Real) -> bool {
    let last_row_ok = mat[(3, 0)].abs() <= tol
        && mat[(3, 1)].abs() <= tol
        && mat[(3, 2)].abs() <= tol
        && (mat[(3, 3)] - 1.0).abs() <= tol;
    if !last_row_ok {
        return false;
    }

    let rot: Matrix3<Real> = mat.fixed_view::<3, 3>(0, 0).into_owned();
    let orthonormal = (rot.transpose() * rot - Matrix3::identity()).amax() <= tol;
    orthonormal && (rot.determinant() - 1.0).abs() <= tol
}

/// Rotation angle (radians, in `[0, π]`) of the rotation block of `mat`.
///
/// Uses `atan2(|vee(R − Rᵀ)| / 2, (tr R − 1) / 2)`, which stays accurate for
/// angles close to zero.
pub fn rotation_angle(mat: &Mat4) -> Real {
    let trace = mat[(0, 0)] + mat[(1, 1)] + mat[(2, 2)];
    let skew = Vec3::new(
        mat[(2, 1)] - mat[(1, 2)],
        mat[(0, 2)] - mat[(2, 0)],
        mat[(1, 0)] - mat[(0, 1)],
    );
    (0.5 * skew.norm()).atan2(0.5 * (trace - 1.0))
}

/// Translation column of `mat`.
pub fn translation(mat: &Mat4) -> Vec3 {
    Vec3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)])
}

/// Pure translation as a homogeneous matrix.
pub fn translation_matrix(t: &Vec3) -> Mat4 {
    Mat4::new_translation(t)
}

/// Rotation about the z axis by `angle` radians.
pub fn rotation_z(angle: Real) -> Mat4 {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle).to_homogeneous()
}

/// Embed a planar rotation and translation into a 4×4 transform with
/// identity z.
pub fn embed_planar(rot: &Mat2, t: &Vec2) -> Mat4 {
    let mut out = Mat4::identity();
    out.fixed_view_mut::<2, 2>(0, 0).copy_from(rot);
    out[(0, 3)] = t.x;
    out[(1, 3)] = t.y;
    out
}

/// Difference between two rigid transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseDelta {
    /// Norm of the translation of `a⁻¹ · b`.
    pub translation: Real,
    /// Rotation angle of `a⁻¹ · b` in radians.
    pub rotation: Real,
}

impl PoseDelta {
    /// `true` if both components are within their tolerances.
    pub fn within(&self, translation_tol: Real, rotation_tol: Real) -> bool {
        self.translation <= translation_tol && self.rotation <= rotation_tol
    }
}

/// Compare two rigid transforms via `a⁻¹ · b`.
pub fn pose_delta(a: &Mat4, b: &Mat4) -> PoseDelta {
    let diff = invert_rigid(a) * b;
    PoseDelta {
        translation: translation(&diff).norm(),
        rotation: rotation_angle(&diff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rigid() -> Mat4 {
        let rot = Rotation3::from_euler_angles(0.1, -0.2, 0.3).to_homogeneous();
        translation_matrix(&Vec3::new(1.5, -2.0, 30.0)) * rot
    }

    #[test]
    fn row_major_round_trip() {
        let m = sample_rigid();
        let flat = mat4_to_row_major(&m);
        assert_eq!(flat[3], m[(0, 3)]);
        assert_eq!(flat[15], 1.0);

        let back = mat4_from_row_major(&flat).unwrap();
        assert!((back - m).amax() < 1e-15);
    }

    #[test]
    fn row_major_rejects_bad_input() {
        assert_eq!(
            mat4_from_row_major(&[0.0; 12]),
            Err(MatrixError::WrongLength(12))
        );

        let mut flat = mat4_to_row_major(&Mat4::identity());
        flat[12] = 0.5;
        assert_eq!(mat4_from_row_major(&flat), Err(MatrixError::NotHomogeneous));
    }

    #[test]
    fn rigid_inverse_matches_general_inverse() {
        let m = sample_rigid();
        let inv = invert_rigid(&m);
        let general = m.try_inverse().unwrap();
        assert!((inv - general).amax() < 1e-12);
        assert!((inv * m - Mat4::identity()).amax() < 1e-12);
    }

    #[test]
    fn base_transform_moves_operator_into_frame() {
        // A translation along global x, seen from a frame rotated by 90°
        // about z, becomes a translation along local -y.
        let frame = rotation_z(std::f64::consts::FRAC_PI_2);
        let shift = translation_matrix(&Vec3::new(1.0, 0.0, 0.0));
        let local = base_transform(&shift, &frame);
        let t = translation(&local);
        assert!((t - Vec3::new(0.0, -1.0, 0.0)).norm() < 1e-12);

        let back = rebase_to_global(&local, &frame);
        assert!((back - shift).amax() < 1e-12);
    }

    #[test]
    fn rigidity_check() {
        assert!(is_rigid(&sample_rigid(), 1e-9));

        let mut scaled = sample_rigid();
        scaled[(0, 0)] *= 1.1;
        assert!(!is_rigid(&scaled, 1e-9));

        let mut mirrored = Mat4::identity();
        mirrored[(2, 2)] = -1.0;
        assert!(!is_rigid(&mirrored, 1e-9));
    }

    #[test]
    fn rotation_angle_resolves_tiny_rotations() {
        assert_eq!(rotation_angle(&Mat4::identity()), 0.0);
        assert!((rotation_angle(&rotation_z(1e-10)) - 1e-10).abs() < 1e-16);
        assert!((rotation_angle(&rotation_z(2.5)) - 2.5).abs() < 1e-12);

        // last-bit noise must not show up as a rotation
        let a = sample_rigid();
        let mut b = a;
        b[(0, 0)] = f64::from_bits(b[(0, 0)].to_bits() + 1);
        assert!(pose_delta(&a, &b).rotation < 1e-12);
    }

    #[test]
    fn pose_delta_reports_rotation_and_translation() {
        let a = sample_rigid();
        let b = a * rotation_z(0.01) * translation_matrix(&Vec3::new(0.0, 0.002, 0.0));
        let delta = pose_delta(&a, &b);
        assert!((delta.rotation - 0.01).abs() < 1e-12);
        assert!((delta.translation - 0.002).abs() < 1e-12);
        assert!(delta.within(0.0021, 0.011));
        assert!(!delta.within(0.001, 0.011));
    }

    #[test]
    fn planar_embedding_keeps_z() {
        let angle: Real = 0.25;
        let rot = Mat2::new(angle.cos(), -angle.sin(), angle.sin(), angle.cos());
        let m = embed_planar(&rot, &Vec2::new(3.0, 4.0));
        let expected = translation_matrix(&Vec3::new(3.0, 4.0, 0.0)) * rotation_z(angle);
        assert!((m - expected).amax() < 1e-12);
        assert!(is_rigid(&m, 1e-12));
    }
}
