//! Least-squares rigid registration of corresponding point sets (Kabsch).
//!
//! Given `source[i] ↔ target[i]`, finds the proper rotation `R`
//! (`det R = +1`) and translation `t` minimising `Σ |R·sᵢ + t − tᵢ|²`.
//! The result is also returned embedded in a homogeneous 4×4 matrix; planar
//! fits leave the z axis untouched.

use lmd_core::{Mat4, Pt2, Pt3, Real};
use log::debug;
use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use thiserror::Error;

/// Spread below which a point set counts as a single point.
const DEGENERATE_EPS: Real = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("point sets differ in length: source {source_len}, target {target_len}")]
    ShapeMismatch {
        source_len: usize,
        target_len: usize,
    },
    #[error("need at least {needed} point correspondences, got {got}")]
    InsufficientPoints { needed: usize, got: usize },
    #[error("all points coincide; rotation is undetermined")]
    DegenerateGeometry,
    #[error("svd failed")]
    SvdFailed,
}

/// Result of a rigid fit in `D` dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidFit<const D: usize> {
    /// Proper rotation, `det = +1`.
    pub rotation: SMatrix<Real, D, D>,
    pub translation: SVector<Real, D>,
    /// Rotation and translation embedded in a homogeneous matrix.
    pub transform: Mat4,
    /// Root-mean-square residual `|R·s + t − t'|` over all pairs.
    pub rms: Real,
}

/// Best-fit rigid transform mapping `source` onto `target` in the plane.
pub fn best_fit_transform_2d(source: &[Pt2], target: &[Pt2]) -> Result<RigidFit<2>, FitError> {
    let src = rows_from(source.iter().map(|p| [p.x, p.y]));
    let tgt = rows_from(target.iter().map(|p| [p.x, p.y]));
    fit::<2>(&src, &tgt)
}

/// Best-fit rigid transform mapping `source` onto `target` in 3D.
pub fn best_fit_transform_3d(source: &[Pt3], target: &[Pt3]) -> Result<RigidFit<3>, FitError> {
    let src = rows_from(source.iter().map(|p| [p.x, p.y, p.z]));
    let tgt = rows_from(target.iter().map(|p| [p.x, p.y, p.z]));
    fit::<3>(&src, &tgt)
}

fn rows_from<const D: usize>(points: impl ExactSizeIterator<Item = [Real; D]>) -> DMatrix<Real> {
    let n = points.len();
    let mut m = DMatrix::<Real>::zeros(n, D);
    for (i, p) in points.enumerate() {
        for (j, v) in p.into_iter().enumerate() {
            m[(i, j)] = v;
        }
    }
    m
}

fn fit<const D: usize>(src: &DMatrix<Real>, tgt: &DMatrix<Real>) -> Result<RigidFit<D>, FitError> {
    let n = src.nrows();
    if tgt.nrows() != n {
        return Err(FitError::ShapeMismatch {
            source_len: n,
            target_len: tgt.nrows(),
        });
    }
    if n < D + 1 {
        return Err(FitError::InsufficientPoints {
            needed: D + 1,
            got: n,
        });
    }

    let c_src: DVector<Real> = src.row_mean().transpose();
    let c_tgt: DVector<Real> = tgt.row_mean().transpose();

    let mut src_c = src.clone();
    let mut tgt_c = tgt.clone();
    for i in 0..n {
        for j in 0..D {
            src_c[(i, j)] -= c_src[j];
            tgt_c[(i, j)] -= c_tgt[j];
        }
    }
    if src_c.amax() < DEGENERATE_EPS || tgt_c.amax() < DEGENERATE_EPS {
        return Err(FitError::DegenerateGeometry);
    }

    let h = src_c.transpose() * &tgt_c;
    let svd = h.svd(true, true);
    let u = svd.u.ok_or(FitError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(FitError::SvdFailed)?;

    let mut v = v_t.transpose();
    let mut r = &v * u.transpose();
    if r.determinant() < 0.0 {
        v.column_mut(D - 1).neg_mut();
        r = &v * u.transpose();
    }

    let t = &c_tgt - &r * &c_src;

    let residuals = src * r.transpose() - tgt;
    let mut sq_sum = 0.0;
    for i in 0..n {
        let mut row_sq = 0.0;
        for j in 0..D {
            let e = residuals[(i, j)] + t[j];
            row_sq += e * e;
        }
        sq_sum += row_sq;
    }
    let rms = (sq_sum / n as Real).sqrt();

    let mut transform = Mat4::identity();
    for row in 0..D {
        for col in 0..D {
            transform[(row, col)] = r[(row, col)];
        }
        transform[(row, 3)] = t[row];
    }

    debug!("rigid fit ({D}D): {n} pairs, rms {rms:.3e}");

    Ok(RigidFit {
        rotation: SMatrix::<Real, D, D>::from_iterator(r.iter().copied()),
        translation: SVector::<Real, D>::from_iterator(t.iter().copied()),
        transform,
        rms,
    })
}
