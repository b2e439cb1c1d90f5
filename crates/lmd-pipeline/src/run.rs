//! End-to-end alignment run: overlap search, then per-module combination.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use lmd_core::{DetectorLayout, Mat4, ModuleId, ModuleLayout, OverlapId, Real, SensorId};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::combiner::{combine_module_alignment, CombineError, ModuleAlignment};
use crate::config::{AlignmentConfig, FailurePolicy};
use crate::overlap::{find_all_overlap_transforms, OverlapScan};
use crate::provider::CorrespondenceProvider;
use crate::tables::{AnchorTable, IdealGeometry};

/// Everything a run produced, including per-overlap and per-module failures.
#[derive(Debug, Clone)]
pub struct AlignmentReport {
    pub overlaps: OverlapScan,
    pub modules: BTreeMap<ModuleId, ModuleAlignment>,
    pub module_failures: BTreeMap<ModuleId, CombineError>,
}

impl AlignmentReport {
    /// Misalignment matrices of every sensor on a successfully combined
    /// module.
    pub fn alignment_matrices(&self) -> BTreeMap<SensorId, Mat4> {
        self.modules
            .values()
            .flat_map(|m| m.matrices.iter().map(|(s, mat)| (*s, *mat)))
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let max_closure = self
            .modules
            .values()
            .map(ModuleAlignment::max_closure_translation)
            .fold(0.0, Real::max);
        let failed_checks = self
            .modules
            .values()
            .flat_map(|m| m.anchor_checks.iter())
            .filter(|c| !c.within_tolerance)
            .count();

        RunSummary {
            overlaps_fitted: self.overlaps.matrices.len(),
            overlap_failures: self
                .overlaps
                .failures
                .iter()
                .map(|(id, err)| FailureEntry {
                    key: id.to_string(),
                    error: err.to_string(),
                })
                .collect(),
            modules_aligned: self.modules.len(),
            module_failures: self
                .module_failures
                .iter()
                .map(|(module, err)| FailureEntry {
                    key: module.path(),
                    error: err.to_string(),
                })
                .collect(),
            sensors_aligned: self.modules.values().map(|m| m.matrices.len()).sum(),
            max_closure_translation_um: max_closure * 1e4,
            failed_anchor_checks: failed_checks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub key: String,
    pub error: String,
}

/// Serializable overview of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub overlaps_fitted: usize,
    pub overlap_failures: Vec<FailureEntry>,
    pub modules_aligned: usize,
    pub module_failures: Vec<FailureEntry>,
    pub sensors_aligned: usize,
    /// Largest loop-closure translation residual over all modules (µm).
    pub max_closure_translation_um: Real,
    pub failed_anchor_checks: usize,
}

/// Fit all overlaps of `layout`, then combine each module.
///
/// With [`FailurePolicy::Abort`] the first failed overlap ends the run.
/// Otherwise failed overlaps are dropped and modules that become
/// disconnected are reported in [`AlignmentReport::module_failures`]; other
/// modules are unaffected. Every sensor in `ideal` belongs to its module's
/// layout, so a sensor no overlap reaches is always reported.
pub fn run_alignment<P>(
    layout: &DetectorLayout,
    ideal: &IdealGeometry,
    provider: &P,
    anchors: &AnchorTable,
    config: &AlignmentConfig,
) -> Result<AlignmentReport>
where
    P: CorrespondenceProvider + ?Sized,
{
    let ids: Vec<OverlapId> = layout.overlap_ids();
    let scan = find_all_overlap_transforms(&ids, provider, &config.finder, &config.pool)
        .context("overlap search")?;

    if config.failure_policy == FailurePolicy::Abort {
        if let Some(err) = scan.failures.values().next() {
            return Err(anyhow::Error::new(err.clone()).context(format!(
                "aborting: {} of {} overlaps failed",
                scan.failures.len(),
                ids.len()
            )));
        }
    }

    // sensors with an ideal matrix but no overlap definition must still be
    // reported as unreachable
    let mut layout = layout.clone();
    layout.include_sensors(ideal.iter().map(|(sensor, _)| *sensor));

    let transforms = scan.transforms();
    let combine = |module: &ModuleLayout| {
        (
            module.module,
            combine_module_alignment(module, &transforms, ideal, anchors, &config.combiner),
        )
    };
    let modules: Vec<_> = layout.modules().collect();
    let outcomes: Vec<(ModuleId, Result<ModuleAlignment, CombineError>)> =
        if config.pool.sequential {
            modules.into_iter().map(combine).collect()
        } else {
            modules.into_par_iter().map(combine).collect()
        };

    let mut report = AlignmentReport {
        overlaps: scan,
        modules: BTreeMap::new(),
        module_failures: BTreeMap::new(),
    };
    for (module, outcome) in outcomes {
        match outcome {
            Ok(alignment) => {
                report.modules.insert(module, alignment);
            }
            Err(err) => {
                warn!("{err}");
                report.module_failures.insert(module, err);
            }
        }
    }

    info!(
        "aligned {} modules ({} sensors), {} modules failed",
        report.modules.len(),
        report.modules.values().map(|m| m.matrices.len()).sum::<usize>(),
        report.module_failures.len()
    );
    Ok(report)
}
