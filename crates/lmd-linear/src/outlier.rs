//! Percentile cut on correspondence residuals.
//!
//! Hit pairs are ranked by the squared in-plane distance between the two
//! hits after removing the mean offset of the whole set, so a global shift
//! between the sensors is not mistaken for outliers. The worst `cut_percent`
//! of pairs are dropped.

use lmd_core::{PlanarCoords, Real, Vec2};
use log::debug;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("point sets differ in length: first {first_len}, second {second_len}")]
    ShapeMismatch { first_len: usize, second_len: usize },
    #[error("cut percentage must be finite and in [0, 100), got {0}")]
    InvalidCut(Real),
}

/// Outcome of ranking a correspondence set.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierCut {
    /// Indices of the retained pairs, best first.
    pub kept: Vec<usize>,
    /// Largest residual among the retained pairs, if any were ranked.
    pub threshold: Option<Real>,
    /// Mean in-plane offset `second − first` removed before ranking.
    pub centroid: Vec2,
}

/// Rank pairs by centered squared residual and select the retained indices.
///
/// `cut_percent == 0` keeps every pair in its original order without ranking.
pub fn outlier_cut<P: PlanarCoords>(
    first: &[P],
    second: &[P],
    cut_percent: Real,
) -> Result<OutlierCut, FilterError> {
    if first.len() != second.len() {
        return Err(FilterError::ShapeMismatch {
            first_len: first.len(),
            second_len: second.len(),
        });
    }
    if !cut_percent.is_finite() || !(0.0..100.0).contains(&cut_percent) {
        return Err(FilterError::InvalidCut(cut_percent));
    }

    let n = first.len();
    if cut_percent == 0.0 || n == 0 {
        return Ok(OutlierCut {
            kept: (0..n).collect(),
            threshold: None,
            centroid: Vec2::zeros(),
        });
    }

    let deltas: Vec<Vec2> = first
        .iter()
        .zip(second)
        .map(|(a, b)| b.xy() - a.xy())
        .collect();
    let centroid = deltas.iter().fold(Vec2::zeros(), |acc, d| acc + d) / n as Real;
    let residuals: Vec<Real> = deltas.iter().map(|d| (d - centroid).norm_squared()).collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| residuals[a].total_cmp(&residuals[b]));

    // n·p is formed before dividing so integral products stay exact.
    let dropped = (n as Real * cut_percent / 100.0).ceil() as usize;
    let keep = n.saturating_sub(dropped);
    order.truncate(keep);

    let threshold = order.last().map(|&i| residuals[i]);
    debug!(
        "outlier cut {cut_percent}%: kept {keep} of {n} pairs, centroid ({:.3e}, {:.3e})",
        centroid.x, centroid.y
    );

    Ok(OutlierCut {
        kept: order,
        threshold,
        centroid,
    })
}

/// Drop the worst `cut_percent` of pairs.
///
/// Returns the retained pairs at their original values, ordered by
/// ascending residual. A cut of 0 returns the inputs unchanged.
pub fn filter_outliers<P: PlanarCoords>(
    first: &[P],
    second: &[P],
    cut_percent: Real,
) -> Result<(Vec<P>, Vec<P>), FilterError> {
    let cut = outlier_cut(first, second, cut_percent)?;
    let kept_first = cut.kept.iter().map(|&i| first[i].clone()).collect();
    let kept_second = cut.kept.iter().map(|&i| second[i].clone()).collect();
    Ok((kept_first, kept_second))
}
