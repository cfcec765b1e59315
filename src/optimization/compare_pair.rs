use serde::{Deserialize, Serialize};

use crate::algorithms::PairwiseResult;
use crate::data::Rect;

/// A candidate pair of tiles and, once registered, their relative shift.
///
/// `first` and `second` index into the tile list the pair was generated for.
/// Once a pair is invalidated it stays invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparePair {
    pub first: usize,
    pub second: usize,
    /// Position of `second` relative to `first`.
    pub relative_shift: Vec<f32>,
    pub cross_correlation: f32,
    pub phase_correlation: f32,
    /// Regions of both tiles to register on, when only parts overlap.
    pub overlap_rois: Option<(Rect, Rect)>,
    valid_overlap: bool,
}

impl ComparePair {
    pub fn new(first: usize, second: usize, num_dimensions: usize) -> Self {
        Self {
            first,
            second,
            relative_shift: vec![0.0; num_dimensions],
            cross_correlation: 0.0,
            phase_correlation: 0.0,
            overlap_rois: None,
            valid_overlap: true,
        }
    }

    pub fn with_overlap_rois(mut self, rois: Option<(Rect, Rect)>) -> Self {
        self.overlap_rois = rois;
        self
    }

    pub fn set_result(&mut self, result: &PairwiseResult) {
        self.relative_shift.clone_from(&result.shift);
        self.cross_correlation = result.cross_correlation;
        self.phase_correlation = result.phase_correlation;
    }

    pub fn is_valid_overlap(&self) -> bool {
        self.valid_overlap
    }

    pub fn invalidate(&mut self) {
        self.valid_overlap = false;
    }

    /// Whether the pair contributes an edge to the tile graph.
    pub fn is_edge(&self, reg_threshold: f32) -> bool {
        self.valid_overlap && self.cross_correlation >= reg_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidation_is_final() {
        let mut pair = ComparePair::new(0, 1, 2);
        pair.set_result(&PairwiseResult {
            shift: vec![4.0, -1.0],
            cross_correlation: 0.9,
            phase_correlation: 0.2,
        });
        assert!(pair.is_edge(0.3));

        pair.invalidate();
        pair.set_result(&PairwiseResult {
            shift: vec![4.0, -1.0],
            cross_correlation: 0.95,
            phase_correlation: 0.2,
        });
        assert!(!pair.is_valid_overlap());
        assert!(!pair.is_edge(0.3));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut pair = ComparePair::new(0, 1, 2);
        pair.cross_correlation = 0.3;
        assert!(pair.is_edge(0.3));
        assert!(!pair.is_edge(0.31));
    }
}
