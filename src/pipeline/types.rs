use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fusion::{FusedImage, FusionBounds};
use crate::optimization::{ComparePair, OptimizationOutcome, Tile, TileKey};

/// Final position of one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePlacement {
    pub key: TileKey,
    pub translation: Vec<f64>,
}

impl TilePlacement {
    pub fn of(tile: &Tile) -> Self {
        Self {
            key: tile.key,
            translation: tile.position().to_vec(),
        }
    }
}

/// Registration result of one pair as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub first: TileKey,
    pub second: TileKey,
    pub shift: Vec<f32>,
    pub cross_correlation: f32,
    pub phase_correlation: f32,
    /// False once the pair was skipped or rejected as an outlier.
    pub valid: bool,
}

impl PairReport {
    pub fn of(pair: &ComparePair, tiles: &[Tile]) -> Self {
        Self {
            first: tiles[pair.first].key,
            second: tiles[pair.second].key,
            shift: pair.relative_shift.clone(),
            cross_correlation: pair.cross_correlation,
            phase_correlation: pair.phase_correlation,
            valid: pair.is_valid_overlap(),
        }
    }
}

/// Everything a stitching run produces.
#[derive(Debug, Serialize)]
pub struct StitchingOutcome {
    pub correlation_id: Uuid,
    /// Placed tiles ordered by timepoint, then id.
    pub placements: Vec<TilePlacement>,
    pub pairs: Vec<PairReport>,
    /// Absent when positions came from manual offsets or were replicated
    /// from the first timepoint.
    pub optimization: Option<OptimizationOutcome>,
    pub fused_bounds: Option<FusionBounds>,
    #[serde(skip)]
    pub fused: Option<FusedImage>,
}

impl StitchingOutcome {
    pub fn placement(&self, key: TileKey) -> Option<&TilePlacement> {
        self.placements.iter().find(|p| p.key == key)
    }
}
