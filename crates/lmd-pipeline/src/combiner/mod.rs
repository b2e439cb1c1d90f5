//! Per-module combination of overlap matrices into sensor misalignments.
//!
//! Overlap matrices only fix sensors relative to each other. The combiner
//! walks the module's overlap graph breadth-first from the anchor sensor,
//! accumulating `total(anchor→S)` for every reachable sensor, and then pins
//! the whole module with the anchor's externally measured matrix:
//!
//! `M_S = G_S⁻¹ · G_anchor · M_anchor · total(anchor→S)`.
//!
//! Overlaps that close a cycle are not needed for the traversal; they are
//! reported as loop-closure residuals instead.

mod chain;

pub use chain::{chain_via, ideal_relative_in_a, overlap_total};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use lmd_core::{
    invert_rigid, is_rigid, pose_delta, Mat4, ModuleId, ModuleLayout, OverlapId, OverlapInfo,
    Real, SensorId,
};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::CombinerOptions;
use crate::tables::{AnchorTable, IdealGeometry};

/// Which input matrix failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRole {
    Ideal(SensorId),
    Anchor(SensorId),
    Overlap(OverlapId),
}

impl fmt::Display for MatrixRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixRole::Ideal(s) => write!(f, "ideal matrix of {s}"),
            MatrixRole::Anchor(s) => write!(f, "anchor matrix of {s}"),
            MatrixRole::Overlap(id) => write!(f, "overlap matrix {id}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CombineError {
    #[error("module {module}: no external matrix for anchor sensor {sensor}")]
    MissingAnchor { module: ModuleId, sensor: SensorId },
    #[error("module {module}: no chain of known overlaps reaches {}", list_sensors(.sensors))]
    MissingOverlap {
        module: ModuleId,
        sensors: Vec<SensorId>,
    },
    #[error("no ideal matrix for {0}")]
    MissingIdealMatrix(SensorId),
    #[error("{0} is not a rigid homogeneous transform")]
    NotRigid(MatrixRole),
}

fn list_sensors(sensors: &[SensorId]) -> String {
    sensors
        .iter()
        .map(|s| format!("sensor {}", s.sensor))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Disagreement between two paths to the same sensor, for an overlap the
/// traversal did not use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoopClosure {
    pub overlap: OverlapId,
    /// Translation difference (cm).
    pub translation: Real,
    /// Rotation difference (rad).
    pub rotation: Real,
}

/// Comparison of a combined matrix with an additional external measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorCheck {
    pub sensor: SensorId,
    pub translation: Real,
    pub rotation: Real,
    pub within_tolerance: bool,
}

/// Combined alignment of one module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAlignment {
    pub module: ModuleId,
    pub anchor: SensorId,
    /// `total(anchor→S)`: pose of each sensor relative to the anchor.
    pub relative: BTreeMap<SensorId, Mat4>,
    /// Misalignment `M_S` of each sensor in its own frame.
    pub matrices: BTreeMap<SensorId, Mat4>,
    /// Overlaps used to reach each sensor, in traversal order.
    pub tree: Vec<OverlapId>,
    pub closure_residuals: Vec<LoopClosure>,
    pub anchor_checks: Vec<AnchorCheck>,
}

impl ModuleAlignment {
    /// Largest translation residual over all loop closures.
    pub fn max_closure_translation(&self) -> Real {
        self.closure_residuals
            .iter()
            .map(|c| c.translation)
            .fold(0.0, Real::max)
    }
}

/// A measured edge of the overlap graph.
struct Edge {
    info: OverlapInfo,
    /// `total(first→second)`.
    total: Mat4,
}

/// Derives every sensor's misalignment on one module.
pub struct AlignmentMatrixCombiner<'a> {
    layout: &'a ModuleLayout,
    ideal: &'a IdealGeometry,
    options: &'a CombinerOptions,
}

impl<'a> AlignmentMatrixCombiner<'a> {
    pub fn new(
        layout: &'a ModuleLayout,
        ideal: &'a IdealGeometry,
        options: &'a CombinerOptions,
    ) -> Self {
        Self {
            layout,
            ideal,
            options,
        }
    }

    /// Combine the module's overlap matrices. `overlaps` may hold matrices
    /// of other modules; only this module's overlaps are read.
    pub fn combine(
        &self,
        overlaps: &BTreeMap<OverlapId, Mat4>,
        anchors: &AnchorTable,
    ) -> Result<ModuleAlignment, CombineError> {
        let module = self.layout.module;
        let anchor = module.sensor(self.options.anchor_sensor);
        let tol = self.options.rigidity_tolerance;

        let Some(&anchor_matrix) = anchors.get(&anchor) else {
            return Err(CombineError::MissingAnchor {
                module,
                sensor: anchor,
            });
        };
        if !self.layout.sensors.contains(&anchor) {
            return Err(CombineError::MissingOverlap {
                module,
                sensors: vec![anchor],
            });
        }
        if !is_rigid(&anchor_matrix, tol) {
            return Err(CombineError::NotRigid(MatrixRole::Anchor(anchor)));
        }

        let ideal = self.ideal_poses()?;
        let edges = self.measured_edges(overlaps, &ideal)?;

        let (relative, tree) = traverse(anchor, &edges);

        let unreached: Vec<SensorId> = self
            .layout
            .sensors
            .iter()
            .filter(|s| !relative.contains_key(*s))
            .copied()
            .collect();
        if !unreached.is_empty() {
            return Err(CombineError::MissingOverlap {
                module,
                sensors: unreached,
            });
        }

        let used: BTreeSet<OverlapId> = tree.iter().copied().collect();
        let closure_residuals: Vec<LoopClosure> = edges
            .iter()
            .filter(|e| !used.contains(&e.info.id))
            .filter_map(|e| {
                let via_edge = relative.get(&e.info.first)? * e.total;
                let delta = pose_delta(&via_edge, relative.get(&e.info.second)?);
                Some(LoopClosure {
                    overlap: e.info.id,
                    translation: delta.translation,
                    rotation: delta.rotation,
                })
            })
            .collect();

        let g_anchor = ideal
            .get(&anchor)
            .ok_or(CombineError::MissingIdealMatrix(anchor))?;
        let anchor_actual = g_anchor * anchor_matrix;
        let matrices: BTreeMap<SensorId, Mat4> = relative
            .iter()
            .filter_map(|(sensor, rel)| {
                let g = ideal.get(sensor)?;
                Some((*sensor, invert_rigid(g) * anchor_actual * rel))
            })
            .collect();

        let anchor_checks = self.cross_check(anchors, anchor, &matrices);

        debug!(
            "module {module}: combined {} sensors from {} overlaps ({} closures)",
            matrices.len(),
            edges.len(),
            closure_residuals.len()
        );

        Ok(ModuleAlignment {
            module,
            anchor,
            relative,
            matrices,
            tree,
            closure_residuals,
            anchor_checks,
        })
    }

    fn ideal_poses(&self) -> Result<BTreeMap<SensorId, Mat4>, CombineError> {
        self.layout
            .sensors
            .iter()
            .map(|&sensor| {
                let pose = *self
                    .ideal
                    .get(&sensor)
                    .ok_or(CombineError::MissingIdealMatrix(sensor))?;
                if !is_rigid(&pose, self.options.rigidity_tolerance) {
                    return Err(CombineError::NotRigid(MatrixRole::Ideal(sensor)));
                }
                Ok((sensor, pose))
            })
            .collect()
    }

    fn measured_edges(
        &self,
        overlaps: &BTreeMap<OverlapId, Mat4>,
        ideal: &BTreeMap<SensorId, Mat4>,
    ) -> Result<Vec<Edge>, CombineError> {
        let mut edges = Vec::with_capacity(self.layout.overlaps.len());
        for info in &self.layout.overlaps {
            let Some(matrix) = overlaps.get(&info.id) else {
                debug!("overlap {} has no matrix", info.id);
                continue;
            };
            if !is_rigid(matrix, self.options.rigidity_tolerance) {
                return Err(CombineError::NotRigid(MatrixRole::Overlap(info.id)));
            }
            let ideal_of = |sensor: SensorId| {
                ideal
                    .get(&sensor)
                    .ok_or(CombineError::MissingIdealMatrix(sensor))
            };
            edges.push(Edge {
                info: *info,
                total: overlap_total(matrix, ideal_of(info.first)?, ideal_of(info.second)?),
            });
        }
        Ok(edges)
    }

    fn cross_check(
        &self,
        anchors: &AnchorTable,
        anchor: SensorId,
        matrices: &BTreeMap<SensorId, Mat4>,
    ) -> Vec<AnchorCheck> {
        anchors
            .for_module(self.layout.module)
            .filter(|(sensor, _)| **sensor != anchor)
            .filter_map(|(sensor, external)| {
                let combined = matrices.get(sensor)?;
                let delta = pose_delta(external, combined);
                let within_tolerance = delta.within(
                    self.options.check_translation_tolerance,
                    self.options.check_rotation_tolerance,
                );
                if !within_tolerance {
                    warn!(
                        "{sensor}: combined matrix differs from external measurement \
                         by {:.2} µm / {:.2} µrad",
                        delta.translation * 1e4,
                        delta.rotation * 1e6
                    );
                }
                Some(AnchorCheck {
                    sensor: *sensor,
                    translation: delta.translation,
                    rotation: delta.rotation,
                    within_tolerance,
                })
            })
            .collect()
    }
}

/// Breadth-first walk from `anchor` over measured edges. Returns
/// `total(anchor→S)` for every reached sensor and the edges used, in order.
fn traverse(anchor: SensorId, edges: &[Edge]) -> (BTreeMap<SensorId, Mat4>, Vec<OverlapId>) {
    let mut relative = BTreeMap::from([(anchor, Mat4::identity())]);
    let mut tree = Vec::new();
    let mut queue = VecDeque::from([anchor]);

    while let Some(current) = queue.pop_front() {
        let Some(&to_current) = relative.get(&current) else {
            continue;
        };
        for edge in edges {
            let Some(next) = edge.info.partner(current) else {
                continue;
            };
            if relative.contains_key(&next) {
                continue;
            }
            let to_next = if edge.info.first == current {
                to_current * edge.total
            } else {
                // edge.total is total(next→current)
                chain_via(&to_current, &edge.total)
            };
            relative.insert(next, to_next);
            tree.push(edge.info.id);
            queue.push_back(next);
        }
    }

    (relative, tree)
}

/// Convenience wrapper around [`AlignmentMatrixCombiner::combine`].
pub fn combine_module_alignment(
    layout: &ModuleLayout,
    overlaps: &BTreeMap<OverlapId, Mat4>,
    ideal: &IdealGeometry,
    anchors: &AnchorTable,
    options: &CombinerOptions,
) -> Result<ModuleAlignment, CombineError> {
    AlignmentMatrixCombiner::new(layout, ideal, options).combine(overlaps, anchors)
}
