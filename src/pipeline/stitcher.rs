use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{PairReport, StitchingOutcome, TilePlacement};
use crate::algorithms::{register_regions, PairwiseResult};
use crate::config::{FusionMethod, StitchingParameters, TimeSelect};
use crate::data::{only_rectangular, PixelBlockAccess, RegionOfInterest, TimepointView};
use crate::error::StitchError;
use crate::fusion::{FusedImage, Fuser};
use crate::logging::{MetricsCollector, PipelineSpan, RegistrationSpan, StageTimer};
use crate::optimization::{
    overlapping_pairs, time_lapse_pairs, ComparePair, OptimizationOutcome, Tile, TileGraphOptimizer, TranslationModel,
};

/// Runs registration, global optimization and fusion for one stitching job.
pub struct Stitcher {
    params: StitchingParameters,
    metrics: Arc<MetricsCollector>,
    correlation_id: Uuid,
}

impl Stitcher {
    pub fn new(params: StitchingParameters) -> crate::Result<Self> {
        params.check()?;
        Ok(Self {
            params,
            metrics: Arc::new(MetricsCollector::new(true)),
            correlation_id: Uuid::new_v4(),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn params(&self) -> &StitchingParameters {
        &self.params
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Registers every pair. Pairs whose blocks cannot be produced are
    /// invalidated and left out of the optimization.
    pub fn register_pairs(&self, tiles: &[Tile], pairs: &mut [ComparePair]) {
        let span = PipelineSpan::new("pairwise", Some(self.correlation_id));
        let _enter = span.enter();
        span.record_input("compare_pairs", pairs.len());
        let timer = StageTimer::start("pairwise", Some(self.correlation_id), Arc::clone(&self.metrics));

        let results: Vec<Option<PairwiseResult>> = if self.params.parallel_pairs {
            pairs.par_iter().map(|pair| self.register_pair(tiles, pair)).collect()
        } else {
            pairs.iter().map(|pair| self.register_pair(tiles, pair)).collect()
        };

        let mut registered = 0;
        for (pair, result) in pairs.iter_mut().zip(results) {
            self.metrics.record_pair(result.as_ref().map(|r| r.cross_correlation));
            match result {
                Some(result) => {
                    pair.set_result(&result);
                    registered += 1;
                }
                None => pair.invalidate(),
            }
        }

        timer.stop();
        span.record_completion("pair_shifts", registered == pairs.len());
    }

    fn register_pair(&self, tiles: &[Tile], pair: &ComparePair) -> Option<PairwiseResult> {
        let (first, second) = (&tiles[pair.first], &tiles[pair.second]);
        let span = RegistrationSpan::new(first.key, second.key, Some(self.correlation_id));
        let _enter = span.enter();

        let (rect1, rect2) = match pair.overlap_rois {
            Some((rect1, rect2)) => (Some(rect1), Some(rect2)),
            None => (only_rectangular(first.roi.as_ref()), only_rectangular(second.roi.as_ref())),
        };

        match register_regions(
            first.image.as_ref(),
            second.image.as_ref(),
            rect1,
            rect2,
            first.key.timepoint,
            second.key.timepoint,
            &self.params,
        ) {
            Ok(result) => {
                span.record_result(&result.shift, result.cross_correlation, result.phase_correlation);
                Some(result)
            }
            Err(e) => {
                span.record_skipped(&format!("{:#}", e));
                None
            }
        }
    }

    /// Global optimization over the registered pairs; models are written into `tiles`.
    pub fn optimize(&self, tiles: &mut [Tile], pairs: &mut [ComparePair]) -> crate::Result<OptimizationOutcome> {
        let span = PipelineSpan::new("optimize", Some(self.correlation_id));
        let _enter = span.enter();
        span.record_input("compare_pairs", pairs.len());
        let timer = StageTimer::start("optimize", Some(self.correlation_id), Arc::clone(&self.metrics));

        let outcome = TileGraphOptimizer::new(&self.params).optimize(tiles, pairs, self.params.fixed_tile);

        timer.stop();
        if let Ok(outcome) = &outcome {
            let accepted = pairs.iter().filter(|p| p.is_valid_overlap()).count();
            self.metrics.record_optimization(accepted, outcome.restarts());
        }
        span.record_completion("tile_models", outcome.is_ok());
        outcome
    }

    /// Stitches two (possibly time-lapse) images.
    ///
    /// Tile `2 * (t - 1)` is the first image at timepoint `t`, tile
    /// `2 * (t - 1) + 1` the second. The first image anchors the result
    /// unless `fixed_tile` says otherwise.
    pub fn stitch_two(
        &self,
        first: Arc<dyn PixelBlockAccess>,
        second: Arc<dyn PixelBlockAccess>,
        roi1: Option<RegionOfInterest>,
        roi2: Option<RegionOfInterest>,
    ) -> crate::Result<StitchingOutcome> {
        let num_dimensions = self.check_dimensionality([first.as_ref(), second.as_ref()])?;
        if first.num_timepoints() != second.num_timepoints() {
            return Err(StitchError::Configuration(format!(
                "images have {} and {} timepoints",
                first.num_timepoints(),
                second.num_timepoints()
            ))
            .into());
        }
        let num_timepoints = first.num_timepoints();

        let mut tiles = Vec::with_capacity(2 * num_timepoints);
        for timepoint in 1..=num_timepoints {
            tiles.push(Tile::new(1, timepoint, Arc::clone(&first)).with_roi(roi1.clone()));
            tiles.push(Tile::new(2, timepoint, Arc::clone(&second)).with_roi(roi2.clone()));
        }

        info!(
            correlation_id = %self.correlation_id,
            timepoints = num_timepoints,
            compute_overlap = self.params.compute_overlap,
            "Stitching two images"
        );

        let replicate_first = !self.params.compute_overlap
            || num_timepoints == 1
            || self.params.time_select == TimeSelect::ApplyFirstToAll;

        let (pairs, optimization) = if replicate_first {
            let mut pair = ComparePair::new(0, 1, num_dimensions);
            if self.params.compute_overlap {
                self.register_pairs(&tiles, std::slice::from_mut(&mut pair));
            } else {
                pair.set_result(&PairwiseResult {
                    shift: self.params.manual_offset(),
                    cross_correlation: 0.0,
                    phase_correlation: 0.0,
                });
            }

            if !pair.is_valid_overlap() {
                return Err(StitchError::BlockUnavailable {
                    channel: self.params.channel1,
                    timepoint: 1,
                    reason: "the first timepoint could not be registered".into(),
                }
                .into());
            }

            let shift: Vec<f64> = pair.relative_shift.iter().map(|&s| s as f64).collect();
            for pair_of_tiles in tiles.chunks_mut(2) {
                pair_of_tiles[0].model.reset();
                pair_of_tiles[1].model.set_translation(&shift);
            }
            (vec![pair], None)
        } else {
            let first_indices: Vec<usize> = (0..num_timepoints).map(|t| 2 * t).collect();
            let second_indices: Vec<usize> = (0..num_timepoints).map(|t| 2 * t + 1).collect();
            let mut pairs = time_lapse_pairs(&first_indices, &second_indices, self.params.time_select, num_dimensions);

            self.register_pairs(&tiles, &mut pairs);
            let outcome = self.optimize(&mut tiles, &mut pairs)?;
            (pairs, Some(outcome))
        };

        let fused = if self.params.fusion_method == FusionMethod::None {
            None
        } else {
            let models: Vec<TranslationModel> = tiles.iter().map(|t| t.model.clone()).collect();
            self.fuse(&[first.as_ref(), second.as_ref()], &models)?
        };

        Ok(self.outcome(&tiles, &pairs, optimization, fused))
    }

    /// Stitches tiles of one timepoint that start at approximate positions.
    ///
    /// Pairs are formed wherever approximate boxes overlap and registered on
    /// the overlap. With `compute_overlap` off the approximate positions are
    /// kept.
    pub fn stitch_collection(&self, mut tiles: Vec<Tile>) -> crate::Result<StitchingOutcome> {
        if tiles.is_empty() {
            return Err(StitchError::Configuration("no tiles to stitch".into()).into());
        }
        self.check_dimensionality(tiles.iter().map(|t| t.image.as_ref()))?;
        let timepoint = tiles[0].key.timepoint;
        if tiles.iter().any(|t| t.key.timepoint != timepoint) {
            return Err(StitchError::Configuration(
                "collection stitching expects tiles of a single timepoint".into(),
            )
            .into());
        }

        info!(
            correlation_id = %self.correlation_id,
            tiles = tiles.len(),
            "Stitching tile collection"
        );

        let (pairs, optimization) = if self.params.compute_overlap {
            let mut pairs = overlapping_pairs(&tiles);
            if pairs.is_empty() {
                warn!("No approximate overlaps between tiles");
            }
            self.register_pairs(&tiles, &mut pairs);
            let outcome = self.optimize(&mut tiles, &mut pairs)?;
            (pairs, Some(outcome))
        } else {
            (Vec::new(), None)
        };

        let placed: Vec<usize> = match &optimization {
            Some(outcome) => outcome.tiles.clone(),
            None => {
                let mut all: Vec<usize> = (0..tiles.len()).collect();
                all.sort_by_key(|&i| tiles[i].key);
                all
            }
        };

        let fused = self.fuse_tiles(&tiles, &placed)?;
        let mut outcome = self.outcome(&tiles, &pairs, optimization, fused);
        outcome.placements = placed.iter().map(|&i| TilePlacement::of(&tiles[i])).collect();
        Ok(outcome)
    }

    /// Fuses the tiles at `indices`, each at its own timepoint.
    pub fn fuse_tiles(&self, tiles: &[Tile], indices: &[usize]) -> crate::Result<Option<FusedImage>> {
        if self.params.fusion_method == FusionMethod::None || indices.is_empty() {
            return Ok(None);
        }
        let views: Vec<TimepointView<'_>> = indices
            .iter()
            .map(|&i| TimepointView::new(tiles[i].image.as_ref(), tiles[i].key.timepoint))
            .collect();
        let images: Vec<&dyn PixelBlockAccess> = views.iter().map(|v| v as &dyn PixelBlockAccess).collect();
        let models: Vec<TranslationModel> = indices.iter().map(|&i| tiles[i].model.clone()).collect();
        self.fuse(&images, &models)
    }

    fn fuse(&self, images: &[&dyn PixelBlockAccess], models: &[TranslationModel]) -> crate::Result<Option<FusedImage>> {
        let span = PipelineSpan::new("fuse", Some(self.correlation_id));
        let _enter = span.enter();
        span.record_input("tiles", models.len());
        let timer = StageTimer::start("fuse", Some(self.correlation_id), Arc::clone(&self.metrics));

        let fused = Fuser::from_params(&self.params).fuse(images, models);

        timer.stop();
        span.record_completion("fused_image", fused.is_ok());
        fused
    }

    fn check_dimensionality<'a, I>(&self, images: I) -> crate::Result<usize>
    where
        I: IntoIterator<Item = &'a dyn PixelBlockAccess>,
    {
        for image in images {
            if image.num_dimensions() != self.params.dimensionality {
                return Err(StitchError::DimensionalityMismatch {
                    first: self.params.dimensionality,
                    second: image.num_dimensions(),
                }
                .into());
            }
        }
        Ok(self.params.dimensionality)
    }

    fn outcome(
        &self,
        tiles: &[Tile],
        pairs: &[ComparePair],
        optimization: Option<OptimizationOutcome>,
        fused: Option<FusedImage>,
    ) -> StitchingOutcome {
        let mut placements: Vec<TilePlacement> = tiles.iter().map(TilePlacement::of).collect();
        placements.sort_by_key(|p| p.key);

        StitchingOutcome {
            correlation_id: self.correlation_id,
            placements,
            pairs: pairs.iter().map(|p| PairReport::of(p, tiles)).collect(),
            optimization,
            fused_bounds: fused.as_ref().map(|f| f.bounds.clone()),
            fused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageData, ImageStack};
    use ndarray::{ArrayD, IxDyn};

    fn ramp(width: usize, height: usize) -> Arc<dyn PixelBlockAccess> {
        let plane = ArrayD::from_shape_fn(IxDyn(&[width, height]), |i| ((i[0] * 7 + i[1] * 3) % 251) as u8);
        Arc::new(ImageData::from(ImageStack::from_plane(plane).unwrap()))
    }

    #[test]
    fn test_manual_offsets_skip_registration() {
        let params = StitchingParameters {
            compute_overlap: false,
            x_offset: 12.4,
            y_offset: -3.0,
            fusion_method: FusionMethod::Average,
            ..Default::default()
        };
        let stitcher = Stitcher::new(params).unwrap();
        let outcome = stitcher.stitch_two(ramp(20, 10), ramp(20, 10), None, None).unwrap();

        assert!(outcome.optimization.is_none());
        assert_eq!(outcome.placements[1].translation, vec![12.0, -3.0]);
        assert_eq!(outcome.pairs[0].cross_correlation, 0.0);
        let bounds = outcome.fused_bounds.unwrap();
        assert_eq!(bounds.offset, vec![0.0, -3.0]);
        assert_eq!(bounds.size, vec![32, 13]);
    }

    #[test]
    fn test_dimensionality_is_checked() {
        let params = StitchingParameters {
            dimensionality: 3,
            ..Default::default()
        };
        let stitcher = Stitcher::new(params).unwrap();
        let err = stitcher.stitch_two(ramp(8, 8), ramp(8, 8), None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StitchError>(),
            Some(StitchError::DimensionalityMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let params = StitchingParameters {
            check_peaks: 0,
            ..Default::default()
        };
        assert!(Stitcher::new(params).is_err());
    }
}
