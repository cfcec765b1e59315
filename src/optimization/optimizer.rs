use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ComparePair, Tile, TileConfiguration, TileKey, TranslationModel};
use crate::config::StitchingParameters;
use crate::error::StitchError;

pub const MAX_ALLOWED_ERROR: f64 = 10.0;
pub const MAX_ITERATIONS: usize = 1000;
pub const MAX_PLATEAU_WIDTH: usize = 200;
/// A maximum error below this is never treated as an outlier.
pub const MIN_REJECTABLE_ERROR: f64 = 0.95;

/// How an optimization run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// Errors are within the thresholds.
    Converged,
    /// No pair passed the registration threshold; only the fixed tile is placed.
    Degenerate,
    /// Outlier removal dropped every edge; only the fixed tile is placed.
    Exhausted,
    /// The numerical step failed; the configuration reached so far is returned.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    /// Indices of the participating tiles, ordered by timepoint then id.
    pub tiles: Vec<usize>,
    pub status: OptimizationStatus,
    pub fixed_tile: usize,
    /// Pairs invalidated as outliers, in removal order.
    pub removed_pairs: Vec<usize>,
    pub average_error: f64,
    pub max_error: f64,
    pub iterations: usize,
}

impl OptimizationOutcome {
    pub fn restarts(&self) -> usize {
        self.removed_pairs.len()
    }
}

/// Places tiles by global least squares over the pairwise shifts, discarding
/// the worst pair and restarting while the residuals look inconsistent.
#[derive(Debug, Clone)]
pub struct TileGraphOptimizer {
    pub reg_threshold: f32,
    pub relative_threshold: f64,
    pub absolute_threshold: f64,
    pub max_allowed_error: f64,
    pub max_iterations: usize,
    pub max_plateau_width: usize,
}

impl Default for TileGraphOptimizer {
    fn default() -> Self {
        Self::new(&StitchingParameters::default())
    }
}

impl TileGraphOptimizer {
    pub fn new(params: &StitchingParameters) -> Self {
        Self {
            reg_threshold: params.reg_threshold,
            relative_threshold: params.relative_threshold,
            absolute_threshold: params.absolute_threshold,
            max_allowed_error: MAX_ALLOWED_ERROR,
            max_iterations: MAX_ITERATIONS,
            max_plateau_width: MAX_PLATEAU_WIDTH,
        }
    }

    fn is_inconsistent(&self, average: f64, max: f64) -> bool {
        (max > average * self.relative_threshold && max > MIN_REJECTABLE_ERROR) || average > self.absolute_threshold
    }

    /// Runs the optimization and writes the fitted models into `tiles`.
    ///
    /// `fixed_tile` anchors the solution when it has any accepted pair;
    /// otherwise the first tile of the largest connected group does. Only the
    /// anchor's group is placed and returned.
    pub fn optimize(
        &self,
        tiles: &mut [Tile],
        pairs: &mut [ComparePair],
        fixed_tile: usize,
    ) -> crate::Result<OptimizationOutcome> {
        if fixed_tile >= tiles.len() {
            return Err(StitchError::Configuration(format!(
                "fixed tile {} out of range for {} tiles",
                fixed_tile,
                tiles.len()
            ))
            .into());
        }
        let num_dimensions = tiles[fixed_tile].model.translation().len();
        if let Some(pair) = pairs.iter().find(|p| p.relative_shift.len() != num_dimensions) {
            return Err(StitchError::DimensionalityMismatch {
                first: num_dimensions,
                second: pair.relative_shift.len(),
            }
            .into());
        }

        let mut removed_pairs = Vec::new();

        loop {
            let mut config = TileConfiguration::build(pairs, self.reg_threshold, tiles.len())?;

            if config.is_empty() {
                tiles[fixed_tile].model.reset();
                let status = if removed_pairs.is_empty() {
                    warn!(
                        fixed = %tiles[fixed_tile].key,
                        "No overlap between any tiles found, keeping only the fixed tile"
                    );
                    OptimizationStatus::Degenerate
                } else {
                    warn!(
                        removed = removed_pairs.len(),
                        "Every pair was rejected as inconsistent, keeping only the fixed tile"
                    );
                    OptimizationStatus::Exhausted
                };
                return Ok(OptimizationOutcome {
                    tiles: vec![fixed_tile],
                    status,
                    fixed_tile,
                    removed_pairs,
                    average_error: 0.0,
                    max_error: 0.0,
                    iterations: 0,
                });
            }

            let anchor = if config.has_connections(fixed_tile) {
                fixed_tile
            } else {
                config.largest_component()[0]
            };
            let dropped = config.retain_component(anchor);
            if !dropped.is_empty() {
                warn!(
                    anchor = %tiles[anchor].key,
                    dropped = dropped.len(),
                    "Tiles without a link to the anchor's group are left out"
                );
            }
            config.fix_tile(anchor);

            let mut models: Vec<TranslationModel> = tiles.iter().map(|t| t.model.clone()).collect();
            models[anchor].reset();
            let attempt = config.pre_align(&mut models).and_then(|unaligned| {
                if !unaligned.is_empty() {
                    debug!(count = unaligned.len(), "Tiles not connected to the fixed tile");
                }
                config.optimize(
                    &mut models,
                    self.max_allowed_error,
                    self.max_iterations,
                    self.max_plateau_width,
                )
            });
            for (tile, model) in tiles.iter_mut().zip(models.iter()) {
                tile.model.clone_from(model);
            }

            let errors = config.errors(&models);
            let participating = ordered_tiles(tiles, config.tiles());

            let iterations = match attempt {
                Ok(iterations) => iterations,
                Err(e) => {
                    warn!(error = %e, "Cannot compute global optimization");
                    return Ok(OptimizationOutcome {
                        tiles: participating,
                        status: OptimizationStatus::Failed(e.to_string()),
                        fixed_tile: anchor,
                        removed_pairs,
                        average_error: errors.average,
                        max_error: errors.max,
                        iterations: 0,
                    });
                }
            };

            if self.is_inconsistent(errors.average, errors.max) {
                if let Some(worst) = config.worst_match(&models) {
                    let pair_index = worst.pair;
                    let pair = &mut pairs[pair_index];
                    warn!(
                        first = %tiles[pair.first].key,
                        second = %tiles[pair.second].key,
                        shift = ?pair.relative_shift,
                        cross_correlation = pair.cross_correlation,
                        average_error = errors.average,
                        max_error = errors.max,
                        "Removing inconsistent link and restarting optimization"
                    );
                    pair.invalidate();
                    removed_pairs.push(pair_index);
                    continue;
                }
            }

            info!(
                tiles = participating.len(),
                iterations = iterations,
                average_error = errors.average,
                max_error = errors.max,
                restarts = removed_pairs.len(),
                "Global optimization converged"
            );
            return Ok(OptimizationOutcome {
                tiles: participating,
                status: OptimizationStatus::Converged,
                fixed_tile: anchor,
                removed_pairs,
                average_error: errors.average,
                max_error: errors.max,
                iterations,
            });
        }
    }
}

fn ordered_tiles(tiles: &[Tile], participating: &[usize]) -> Vec<usize> {
    let mut ordered = participating.to_vec();
    ordered.sort_by_key(|&i| tile_key(tiles, i));
    ordered
}

fn tile_key(tiles: &[Tile], index: usize) -> TileKey {
    tiles[index].key
}
