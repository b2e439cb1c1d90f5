//! Deterministic synthetic detector data.
//!
//! Building blocks for alignment tests:
//! - a reference ideal geometry for every sensor of a module,
//! - seeded random planar misalignments,
//! - hit pairs for an overlap region, with optional noise and outliers.
//!
//! All misalignments produced here are planar (rotation about z plus an
//! in-plane shift), so the planar overlap fit recovers them exactly on
//! noise-free data.
//!
//! # Example
//!
//! ```no_run
//! use lmd_core::synthetic::{geometry::{MisalignmentRange, SyntheticModule}, hits::HitOptions};
//! use lmd_core::ModuleId;
//!
//! let range = MisalignmentRange::default();
//! let module = SyntheticModule::reference(ModuleId::new(0, 1, 2), &range, 7);
//! let pairs = module.all_hit_pairs(&HitOptions::default());
//! assert_eq!(pairs.len(), 9);
//! ```

pub mod geometry;
pub mod hits;
