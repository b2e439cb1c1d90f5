//! Detector addressing and topology.
//!
//! The luminosity detector is a fixed hierarchy of 2 halves × 4 planes ×
//! 5 modules, each module carrying 9 sensors with 9 pairwise overlap
//! regions.

mod ids;
mod layout;

pub use ids::{
    ModuleId, OverlapId, PathError, SensorId, HALVES, MODULES_PER_PLANE, OVERLAPS_PER_MODULE,
    PLANES, SENSORS_PER_MODULE,
};
pub use layout::{DetectorLayout, LayoutError, ModuleLayout, OverlapInfo, REFERENCE_OVERLAP_PAIRS};
