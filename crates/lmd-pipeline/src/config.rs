//! Run configuration.
//!
//! Every field has a default so a partial JSON document (or `{}`) is a valid
//! configuration.

use lmd_core::Real;
use serde::{Deserialize, Serialize};

/// Options for a single overlap fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapFinderOptions {
    /// Percentage of worst hit pairs dropped before fitting, in `[0, 100)`.
    /// Default is 90: most raw pairs are track-projection residuals rather
    /// than true overlap hits.
    ///
    /// The cut ranks pairs by distance from the mean displacement, so on
    /// clean but noisy data it keeps a small central patch and the fitted
    /// rotation gets worse. Use a light cut (or 0) for such data.
    #[serde(default = "default_cut_percent")]
    pub cut_percent: Real,
    /// Minimum number of hit pairs required before the cut. Default is 30.
    #[serde(default = "default_min_pairs")]
    pub min_pairs: usize,
    /// Fit only the in-plane components (x, y). Default is `true`.
    #[serde(default = "default_true")]
    pub planar: bool,
}

impl Default for OverlapFinderOptions {
    fn default() -> Self {
        Self {
            cut_percent: default_cut_percent(),
            min_pairs: default_min_pairs(),
            planar: true,
        }
    }
}

/// Worker pool for the overlap search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum number of concurrent overlap fits. Default is 16.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Run every fit on the calling thread, in ascending ID order.
    #[serde(default)]
    pub sequential: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            sequential: false,
        }
    }
}

/// Options for per-module matrix combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinerOptions {
    /// Sensor index whose external matrix fixes the module. Default is 0.
    #[serde(default)]
    pub anchor_sensor: u8,
    /// Tolerance for accepting ideal, anchor and overlap matrices as rigid.
    #[serde(default = "default_rigidity_tolerance")]
    pub rigidity_tolerance: Real,
    /// Translation tolerance (cm) when cross-checking against additional
    /// external matrices.
    #[serde(default = "default_check_translation")]
    pub check_translation_tolerance: Real,
    /// Rotation tolerance (rad) for the same cross-checks.
    #[serde(default = "default_check_rotation")]
    pub check_rotation_tolerance: Real,
}

impl Default for CombinerOptions {
    fn default() -> Self {
        Self {
            anchor_sensor: 0,
            rigidity_tolerance: default_rigidity_tolerance(),
            check_translation_tolerance: default_check_translation(),
            check_rotation_tolerance: default_check_rotation(),
        }
    }
}

/// What to do when some overlaps could not be fitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report failed overlaps and combine every module that stays connected.
    #[default]
    Skip,
    /// Stop the run at the first failed overlap.
    Abort,
}

/// Complete configuration of an alignment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub finder: OverlapFinderOptions,
    #[serde(default)]
    pub pool: PoolOptions,
    #[serde(default)]
    pub combiner: CombinerOptions,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_cut_percent() -> Real {
    90.0
}

fn default_min_pairs() -> usize {
    30
}

fn default_true() -> bool {
    true
}

fn default_threads() -> usize {
    16
}

fn default_rigidity_tolerance() -> Real {
    1e-6
}

fn default_check_translation() -> Real {
    1e-3
}

fn default_check_rotation() -> Real {
    1e-4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg: AlignmentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AlignmentConfig::default());
        assert_eq!(cfg.finder.cut_percent, 90.0);
        assert_eq!(cfg.finder.min_pairs, 30);
        assert!(cfg.finder.planar);
        assert_eq!(cfg.pool.threads, 16);
        assert_eq!(cfg.failure_policy, FailurePolicy::Skip);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let doc = r#"{
            "finder": { "cut_percent": 50 },
            "pool": { "sequential": true },
            "failure_policy": "abort"
        }"#;
        let cfg: AlignmentConfig = serde_json::from_str(doc).unwrap();
        assert_eq!(cfg.finder.cut_percent, 50.0);
        assert_eq!(cfg.finder.min_pairs, 30);
        assert!(cfg.pool.sequential);
        assert_eq!(cfg.pool.threads, 16);
        assert_eq!(cfg.failure_policy, FailurePolicy::Abort);
    }
}
