//! Overlap-matrix alignment of luminosity-detector sensors.
//!
//! The pipeline runs in two stages:
//! 1. [`find_all_overlap_transforms`] fits one rigid matrix per overlap
//!    region on a bounded worker pool ([`overlap`]),
//! 2. [`combine_module_alignment`] turns a module's overlap matrices, the
//!    ideal geometry and an anchor measurement into one misalignment matrix
//!    per sensor ([`combiner`]).
//!
//! [`run_alignment`] chains both stages over a whole detector layout.
//! [`io`] reads and writes the JSON files used by the command-line tool,
//! and [`comparator`] checks results against known misalignments on
//! simulated data.

pub mod combiner;
pub mod comparator;
pub mod config;
pub mod io;
pub mod overlap;
mod provider;
mod run;
mod tables;

pub use combiner::{
    combine_module_alignment, AlignmentMatrixCombiner, AnchorCheck, CombineError, LoopClosure,
    MatrixRole, ModuleAlignment,
};
pub use config::{
    AlignmentConfig, CombinerOptions, FailurePolicy, OverlapFinderOptions, PoolOptions,
};
pub use overlap::{
    find_all_overlap_transforms, find_overlap_transform, OverlapError, OverlapMatrix,
    OverlapMatrixFinder, OverlapScan, PoolError,
};
pub use provider::CorrespondenceProvider;
pub use run::{run_alignment, AlignmentReport, FailureEntry, RunSummary};
pub use tables::{AnchorTable, IdealGeometry};
