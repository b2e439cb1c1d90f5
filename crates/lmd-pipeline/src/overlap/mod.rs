//! Overlap matrices: single fits and the concurrent search over many IDs.

mod finder;
mod pool;

pub use finder::{find_overlap_transform, OverlapError, OverlapMatrix, OverlapMatrixFinder};
pub use pool::{find_all_overlap_transforms, OverlapScan, PoolError};
