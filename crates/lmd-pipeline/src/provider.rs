//! Sources of hit correspondences.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use lmd_core::{HitPairs, OverlapId};

/// Supplies the hit pairs of an overlap region.
///
/// Implementations are shared by all pool workers, hence `Sync`.
pub trait CorrespondenceProvider: Sync {
    fn hit_pairs(&self, id: OverlapId) -> Result<HitPairs>;
}

impl CorrespondenceProvider for BTreeMap<OverlapId, HitPairs> {
    fn hit_pairs(&self, id: OverlapId) -> Result<HitPairs> {
        self.get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("no hit pairs for overlap {id}"))
    }
}

impl CorrespondenceProvider for HashMap<OverlapId, HitPairs> {
    fn hit_pairs(&self, id: OverlapId) -> Result<HitPairs> {
        self.get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("no hit pairs for overlap {id}"))
    }
}
