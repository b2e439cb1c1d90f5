//! Mathematical utilities and type definitions.
//!
//! This module provides the fundamental types used throughout the workspace
//! and helpers for 4×4 homogeneous rigid transforms.

use nalgebra::{Matrix2, Matrix3, Matrix4, Point2, Point3, Vector2, Vector3};

pub mod transform;

pub use transform::{
    base_transform, embed_planar, invert_rigid, is_rigid, mat4_from_row_major, mat4_to_row_major,
    pose_delta, rebase_to_global, rotation_angle, rotation_z, translation, translation_matrix,
    FlatMatrix, MatrixError, PoseDelta,
};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 2×2 matrix with [`Real`] entries.
pub type Mat2 = Matrix2<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;

/// Apply a homogeneous 4×4 transform to a 3D point.
///
/// The last row is assumed to be `[0, 0, 0, 1]`, so no perspective division
/// is performed.
pub fn transform_point(mat: &Mat4, p: &Pt3) -> Pt3 {
    let v = mat * p.to_homogeneous();
    Pt3::new(v.x, v.y, v.z)
}

/// Access to the in-plane (x, y) components of a hit position.
///
/// Implemented for [`Pt2`] and [`Pt3`] so that planar residuals can be
/// computed on either representation.
pub trait PlanarCoords: Clone {
    /// In-plane components of the point.
    fn xy(&self) -> Vec2;
}

impl PlanarCoords for Pt2 {
    fn xy(&self) -> Vec2 {
        self.coords
    }
}

impl PlanarCoords for Pt3 {
    fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}
