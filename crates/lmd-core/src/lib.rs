//! Core math and detector primitives for luminosity-detector sensor alignment.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Pt2`, `Pt3`, `Mat4`, ...) and
//!   homogeneous-transform helpers (base transforms, rigid inverses,
//!   flattened row-major conversion),
//! - typed detector identifiers ([`SensorId`], [`ModuleId`], [`OverlapId`])
//!   and the module/overlap topology of the reference geometry,
//! - [`HitPairs`], the hit correspondences of one overlap region,
//! - a synthetic misaligned-detector generator used by tests and examples.
//!
//! Frame convention: an ideal (design) matrix `G_S` is the pose of sensor `S`
//! in the global frame; it maps sensor-local coordinates into global
//! coordinates. A misalignment `M_S` is expressed in the sensor's own frame,
//! so the actual pose is `G_S * M_S`.

/// Typed detector addresses and topology.
pub mod detector;
/// Linear algebra type aliases and homogeneous-transform helpers.
pub mod math;
mod pairs;
/// Synthetic misaligned detector geometry.
pub mod synthetic;

pub use detector::*;
pub use math::*;
pub use pairs::HitPairs;
