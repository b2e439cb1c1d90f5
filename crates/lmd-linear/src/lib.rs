//! Closed-form building blocks of the overlap fit.
//!
//! - [`best_fit_transform_2d`] / [`best_fit_transform_3d`]: Kabsch rigid
//!   registration of corresponding point sets,
//! - [`filter_outliers`]: percentile cut on bias-corrected pair residuals.

mod outlier;
mod rigid;

pub use outlier::*;
pub use rigid::*;
