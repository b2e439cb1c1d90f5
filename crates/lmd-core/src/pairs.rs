//! Hit correspondences of one overlap region.

use serde::{Deserialize, Serialize};

use crate::math::Pt3;

/// The same physical hits reconstructed through two overlapping sensors.
///
/// `first[i]` and `second[i]` belong to the same track; index order is the
/// correspondence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitPairs {
    /// Hits as seen through the overlap's first sensor.
    pub first: Vec<Pt3>,
    /// Hits as seen through the overlap's second sensor.
    pub second: Vec<Pt3>,
}

impl HitPairs {
    pub fn new(first: Vec<Pt3>, second: Vec<Pt3>) -> Self {
        Self { first, second }
    }

    /// Number of pairs, or `None` if the two sides differ in length.
    pub fn len_checked(&self) -> Option<usize> {
        (self.first.len() == self.second.len()).then_some(self.first.len())
    }

    pub fn len(&self) -> usize {
        self.first.len().min(self.second.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
