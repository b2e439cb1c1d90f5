//! Rigid fit of a single overlap region.

use lmd_core::{HitPairs, Mat4, OverlapId, Pt2, Pt3, Real};
use lmd_linear::{
    best_fit_transform_2d, best_fit_transform_3d, filter_outliers, FilterError, FitError,
};
use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::config::OverlapFinderOptions;

/// Failure to produce the matrix of one overlap.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OverlapError {
    #[error("overlap {id}: hit sets differ in length ({first} vs {second})")]
    ShapeMismatch {
        id: OverlapId,
        first: usize,
        second: usize,
    },
    #[error("overlap {id}: {got} hit pairs, need at least {needed}")]
    InsufficientData {
        id: OverlapId,
        needed: usize,
        got: usize,
    },
    #[error("overlap {id}: outlier cut rejected")]
    Filter {
        id: OverlapId,
        #[source]
        source: FilterError,
    },
    #[error("overlap {id}: rigid fit failed")]
    Fit {
        id: OverlapId,
        #[source]
        source: FitError,
    },
    #[error("overlap {id}: could not load hit pairs: {message}")]
    Provider { id: OverlapId, message: String },
    #[error("overlap {id}: worker panicked: {message}")]
    WorkerFailure { id: OverlapId, message: String },
}

impl OverlapError {
    /// Overlap the failure is reported against.
    pub fn id(&self) -> OverlapId {
        match self {
            OverlapError::ShapeMismatch { id, .. }
            | OverlapError::InsufficientData { id, .. }
            | OverlapError::Filter { id, .. }
            | OverlapError::Fit { id, .. }
            | OverlapError::Provider { id, .. }
            | OverlapError::WorkerFailure { id, .. } => *id,
        }
    }
}

/// Fitted relative misalignment of an overlap's sensor pair.
///
/// `matrix` is expressed in the global frame and satisfies
/// `M_second^g = M_first^g · matrix`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapMatrix {
    pub id: OverlapId,
    pub matrix: Mat4,
    /// Hit pairs supplied.
    pub pairs_total: usize,
    /// Hit pairs left after the outlier cut.
    pub pairs_used: usize,
    /// RMS residual of the fit on the retained pairs.
    pub rms: Real,
}

/// Turns the hit pairs of one overlap into an [`OverlapMatrix`].
#[derive(Debug, Clone, Default)]
pub struct OverlapMatrixFinder {
    options: OverlapFinderOptions,
}

impl OverlapMatrixFinder {
    pub fn new(options: OverlapFinderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OverlapFinderOptions {
        &self.options
    }

    /// Cut outliers and fit hits seen through the second sensor (source)
    /// onto hits seen through the first (target).
    pub fn find(&self, id: OverlapId, pairs: &HitPairs) -> Result<OverlapMatrix, OverlapError> {
        let total = pairs.len_checked().ok_or(OverlapError::ShapeMismatch {
            id,
            first: pairs.first.len(),
            second: pairs.second.len(),
        })?;
        if total < self.options.min_pairs {
            return Err(OverlapError::InsufficientData {
                id,
                needed: self.options.min_pairs,
                got: total,
            });
        }

        let (first, second) = filter_outliers(&pairs.first, &pairs.second, self.options.cut_percent)
            .map_err(|source| OverlapError::Filter { id, source })?;

        let (matrix, rms) = if self.options.planar {
            let target = planar(&first);
            let source = planar(&second);
            let fit = best_fit_transform_2d(&source, &target)
                .map_err(|source| OverlapError::Fit { id, source })?;
            (fit.transform, fit.rms)
        } else {
            let fit = best_fit_transform_3d(&second, &first)
                .map_err(|source| OverlapError::Fit { id, source })?;
            (fit.transform, fit.rms)
        };

        debug!(
            "overlap {id}: {} of {total} pairs after cut, rms {rms:.3e}",
            first.len()
        );

        Ok(OverlapMatrix {
            id,
            matrix,
            pairs_total: total,
            pairs_used: first.len(),
            rms,
        })
    }
}

fn planar(points: &[Pt3]) -> Vec<Pt2> {
    points.iter().map(|p| Pt2::new(p.x, p.y)).collect()
}

/// Overlap matrix for `pairs` with default options and the given cut.
pub fn find_overlap_transform(
    id: OverlapId,
    pairs: &HitPairs,
    cut_percent: Real,
) -> Result<Mat4, OverlapError> {
    let finder = OverlapMatrixFinder::new(OverlapFinderOptions {
        cut_percent,
        ..OverlapFinderOptions::default()
    });
    finder.find(id, pairs).map(|m| m.matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmd_core::{
        pose_delta,
        synthetic::{
            geometry::{MisalignmentRange, SyntheticModule},
            hits::HitOptions,
        },
        ModuleId,
    };

    fn module() -> SyntheticModule {
        SyntheticModule::reference(ModuleId::new(0, 1, 3), &MisalignmentRange::default(), 11)
    }

    #[test]
    fn recovers_true_overlap_matrix() {
        let module = module();
        let opts = HitOptions {
            outlier_fraction: 0.3,
            ..HitOptions::default()
        };
        for info in &module.layout.overlaps {
            let pairs = module.hit_pairs(info, &opts);
            let found = OverlapMatrixFinder::default().find(info.id, &pairs).unwrap();
            assert_eq!(found.pairs_total, 2000);
            assert_eq!(found.pairs_used, 200);

            let delta = pose_delta(&found.matrix, &module.true_overlap_matrix(info));
            assert!(delta.translation < 1e-8, "{}: {}", info.id, delta.translation);
            assert!(delta.rotation < 1e-9, "{}: {}", info.id, delta.rotation);
        }
    }

    #[test]
    fn spatial_fit_matches_planar_fit_on_planar_data() {
        let module = module();
        let info = module.layout.overlaps[3];
        let pairs = module.hit_pairs(&info, &HitOptions::default());
        let planar = find_overlap_transform(info.id, &pairs, 0.0).unwrap();

        // hits of one overlap share a z, so lift the second set off the plane
        // to give the 3D fit a well-conditioned problem
        let mut lifted = pairs.clone();
        for (a, b) in lifted.first.iter_mut().zip(lifted.second.iter_mut()).step_by(2) {
            a.z += 1.0;
            b.z += 1.0;
        }
        let spatial = OverlapMatrixFinder::new(OverlapFinderOptions {
            cut_percent: 0.0,
            planar: false,
            ..OverlapFinderOptions::default()
        })
        .find(info.id, &lifted)
        .unwrap();
        assert!(pose_delta(&planar, &spatial.matrix).translation < 1e-6);
    }

    #[test]
    fn rejects_bad_input() {
        let id = OverlapId(1234);
        let short = HitPairs::new(vec![Pt3::origin(); 10], vec![Pt3::origin(); 10]);
        assert_eq!(
            OverlapMatrixFinder::default().find(id, &short),
            Err(OverlapError::InsufficientData {
                id,
                needed: 30,
                got: 10
            })
        );

        let uneven = HitPairs::new(vec![Pt3::origin(); 40], vec![Pt3::origin(); 39]);
        let err = OverlapMatrixFinder::default().find(id, &uneven).unwrap_err();
        assert!(matches!(err, OverlapError::ShapeMismatch { first: 40, second: 39, .. }));
        assert_eq!(err.id(), id);

        let same = HitPairs::new(vec![Pt3::origin(); 40], vec![Pt3::origin(); 40]);
        assert!(matches!(
            find_overlap_transform(id, &same, 0.0),
            Err(OverlapError::Fit {
                source: FitError::DegenerateGeometry,
                ..
            })
        ));
        assert!(matches!(
            find_overlap_transform(id, &same, 120.0),
            Err(OverlapError::Filter { .. })
        ));
    }
}
