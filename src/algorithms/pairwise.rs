use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use super::phase_correlation::{refined_shift, PhaseCorrelation};
use crate::config::StitchingParameters;
use crate::data::{only_rectangular, PixelBlockAccess, Rect, RegionOfInterest};
use crate::error::StitchError;

/// Registration of one tile pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseResult {
    /// Offset of the second tile relative to the first, one value per dimension.
    pub shift: Vec<f32>,
    /// Pearson correlation of the overlap at `shift`.
    pub cross_correlation: f32,
    /// Height of the phase-correlation peak.
    pub phase_correlation: f32,
}

/// Registers `second` against `first` at the given (1-based) timepoints.
///
/// Only rectangular regions restrict the search; other shapes are ignored.
/// The returned shift is expressed in full-tile coordinates.
pub fn stitch_pairwise(
    first: &dyn PixelBlockAccess,
    second: &dyn PixelBlockAccess,
    roi1: Option<&RegionOfInterest>,
    roi2: Option<&RegionOfInterest>,
    timepoint1: usize,
    timepoint2: usize,
    params: &StitchingParameters,
) -> crate::Result<PairwiseResult> {
    register_regions(
        first,
        second,
        only_rectangular(roi1),
        only_rectangular(roi2),
        timepoint1,
        timepoint2,
        params,
    )
}

pub fn register_regions(
    first: &dyn PixelBlockAccess,
    second: &dyn PixelBlockAccess,
    rect1: Option<Rect>,
    rect2: Option<Rect>,
    timepoint1: usize,
    timepoint2: usize,
    params: &StitchingParameters,
) -> crate::Result<PairwiseResult> {
    params.check()?;

    let (n1, n2) = (first.num_dimensions(), second.num_dimensions());
    if n1 != n2 {
        return Err(StitchError::DimensionalityMismatch { first: n1, second: n2 }.into());
    }
    if n1 != params.dimensionality {
        return Err(StitchError::Configuration(format!(
            "tiles are {}D but {}D stitching was requested",
            n1, params.dimensionality
        ))
        .into());
    }

    let block1 = first.block(params.channel1, timepoint1, rect1.as_ref())?;
    let block2 = second.block(params.channel2, timepoint2, rect2.as_ref())?;

    let mut result = compute_phase_correlation(
        &block1.view(),
        &block2.view(),
        params.check_peaks,
        params.subpixel_accuracy,
    )?;

    if let Some(rect) = rect2 {
        result.shift[0] -= rect.x as f32;
        result.shift[1] -= rect.y as f32;
    }
    if let Some(rect) = rect1 {
        result.shift[0] += rect.x as f32;
        result.shift[1] += rect.y as f32;
    }

    Ok(result)
}

/// Phase correlation of two `f32` blocks, verified by cross-correlation on the
/// `num_peaks` strongest peaks.
pub fn compute_phase_correlation(
    first: &ArrayViewD<f32>,
    second: &ArrayViewD<f32>,
    num_peaks: usize,
    subpixel_accuracy: bool,
) -> crate::Result<PairwiseResult> {
    let outcome = PhaseCorrelation::new(num_peaks).process(first, second)?;

    let (shift, phase_correlation) = if subpixel_accuracy {
        refined_shift(&outcome)
    } else {
        let shift = outcome.best.shift.iter().map(|&s| s as f32).collect();
        (shift, outcome.best.phase_correlation)
    };

    Ok(PairwiseResult {
        shift,
        cross_correlation: outcome.best.cross_correlation,
        phase_correlation,
    })
}
