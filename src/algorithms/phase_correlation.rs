use ndarray::{ArrayD, ArrayViewD};
use rayon::prelude::*;
use tracing::{debug, trace};

use super::cross_correlation::test_cross_correlation;
use super::fft::{compute_fft, compute_ifft, cross_power_spectrum, extend_mirror_fading, extension_for};
use super::subpixel::refine_peak;
use crate::error::StitchError;

/// One shift hypothesis derived from a phase-correlation peak.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCorrelationPeak {
    /// Integer location of the peak in the correlation surface.
    pub surface_position: Vec<usize>,
    /// Shift of the second block relative to the first.
    pub shift: Vec<isize>,
    pub phase_correlation: f32,
    pub cross_correlation: f32,
    pub num_samples: usize,
}

#[derive(Debug, Clone)]
pub struct PhaseCorrelationOutcome {
    pub best: PhaseCorrelationPeak,
    /// Every candidate that was checked, in enumeration order.
    pub candidates: Vec<PhaseCorrelationPeak>,
    /// The real part of the inverse cross-power spectrum, periodic.
    pub surface: ArrayD<f32>,
}

/// Fourier-based translation search between two equally ranked blocks.
#[derive(Debug, Clone)]
pub struct PhaseCorrelation {
    num_peaks: usize,
    parallel: bool,
}

impl PhaseCorrelation {
    pub fn new(num_peaks: usize) -> Self {
        Self {
            num_peaks,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn num_peaks(&self) -> usize {
        self.num_peaks
    }

    pub fn process(&self, first: &ArrayViewD<f32>, second: &ArrayViewD<f32>) -> crate::Result<PhaseCorrelationOutcome> {
        if first.ndim() != second.ndim() {
            return Err(StitchError::DimensionalityMismatch {
                first: first.ndim(),
                second: second.ndim(),
            }
            .into());
        }
        if self.num_peaks == 0 {
            return Err(StitchError::Configuration("at least one peak must be checked".into()).into());
        }

        let surface = self.correlation_surface(first, second);
        let maxima = self.strongest_maxima(&surface);
        trace!(num_maxima = maxima.len(), "local maxima of the correlation surface");

        let shape = surface.shape().to_vec();
        let hypotheses: Vec<(Vec<usize>, Vec<isize>, f32)> = maxima
            .iter()
            .flat_map(|(position, value)| {
                candidate_shifts(position, &shape)
                    .into_iter()
                    .map(move |shift| (position.clone(), shift, *value))
            })
            .collect();

        let score = |(position, shift, value): &(Vec<usize>, Vec<isize>, f32)| {
            let cc = test_cross_correlation(first, second, shift);
            PhaseCorrelationPeak {
                surface_position: position.clone(),
                shift: shift.clone(),
                phase_correlation: *value,
                cross_correlation: cc.r,
                num_samples: cc.num_samples,
            }
        };
        let candidates: Vec<PhaseCorrelationPeak> = if self.parallel {
            hypotheses.par_iter().map(score).collect()
        } else {
            hypotheses.iter().map(score).collect()
        };

        let best = strongest_cross_correlation(&candidates)
            .cloned()
            .ok_or_else(|| StitchError::Numerical("correlation surface has no maxima".into()))?;

        debug!(
            shift = ?best.shift,
            cross_correlation = best.cross_correlation,
            phase_correlation = best.phase_correlation,
            num_candidates = candidates.len(),
            "best phase correlation candidate"
        );

        Ok(PhaseCorrelationOutcome {
            best,
            candidates,
            surface,
        })
    }

    /// Inverse of the normalized cross-power spectrum of both blocks, each
    /// extended by a mirrored border fading to its mean so that the block
    /// edges do not dominate the whitened spectrum.
    fn correlation_surface(&self, first: &ArrayViewD<f32>, second: &ArrayViewD<f32>) -> ArrayD<f32> {
        let max_size: Vec<usize> = first
            .shape()
            .iter()
            .zip(second.shape())
            .map(|(&a, &b)| a.max(b))
            .collect();
        let extension = extension_for(&max_size);
        let size: Vec<usize> = max_size.iter().zip(&extension).map(|(&n, &e)| n + 2 * e).collect();

        let mut fft1 = extend_mirror_fading(first, &size, &extension);
        let mut fft2 = extend_mirror_fading(second, &size, &extension);
        compute_fft(&mut fft1, self.parallel);
        compute_fft(&mut fft2, self.parallel);

        let mut spectrum = cross_power_spectrum(&fft1, &fft2);
        compute_ifft(&mut spectrum, self.parallel);
        spectrum.mapv(|c| c.re)
    }

    /// Local maxima over the periodic 3^n neighbourhood, strongest first,
    /// limited to `num_peaks`. Equal values keep raster order.
    fn strongest_maxima(&self, surface: &ArrayD<f32>) -> Vec<(Vec<usize>, f32)> {
        let shape = surface.shape().to_vec();
        let flat: Vec<f32> = surface.iter().copied().collect();
        let neighbours = neighbour_offsets(shape.len());

        let is_local_max = |i: usize| -> Option<(usize, f32)> {
            let value = flat[i];
            let coords = unravel(i, &shape);
            let dominated = neighbours.iter().any(|offset| {
                let mut flat_index = 0usize;
                for d in 0..shape.len() {
                    let len = shape[d] as isize;
                    let c = (coords[d] as isize + offset[d]).rem_euclid(len) as usize;
                    flat_index = flat_index * shape[d] + c;
                }
                flat[flat_index] > value
            });
            (!dominated).then_some((i, value))
        };

        let mut maxima: Vec<(usize, f32)> = if self.parallel {
            (0..flat.len()).into_par_iter().filter_map(is_local_max).collect()
        } else {
            (0..flat.len()).filter_map(is_local_max).collect()
        };
        maxima.sort_by(|a, b| b.1.total_cmp(&a.1));
        maxima.truncate(self.num_peaks);

        maxima
            .into_iter()
            .map(|(i, value)| (unravel(i, &shape), value))
            .collect()
    }
}

/// The candidate with the highest cross-correlation; the earliest one wins ties.
pub fn strongest_cross_correlation(candidates: &[PhaseCorrelationPeak]) -> Option<&PhaseCorrelationPeak> {
    let mut best: Option<&PhaseCorrelationPeak> = None;
    for candidate in candidates {
        if best.map_or(true, |b| candidate.cross_correlation > b.cross_correlation) {
            best = Some(candidate);
        }
    }
    best
}

/// A peak at `p` in a periodic surface of size `n` stands for shifts `p` and
/// `p - n` in every dimension.
pub fn candidate_shifts(position: &[usize], shape: &[usize]) -> Vec<Vec<isize>> {
    let ndim = position.len();
    (0..(1usize << ndim))
        .filter(|mask| (0..ndim).all(|d| (mask >> d) & 1 == 0 || position[d] != 0))
        .map(|mask| {
            (0..ndim)
                .map(|d| {
                    let p = position[d] as isize;
                    if (mask >> d) & 1 == 1 {
                        p - shape[d] as isize
                    } else {
                        p
                    }
                })
                .collect()
        })
        .collect()
}

/// Applies a subpixel fit at the best candidate's surface position.
pub fn refined_shift(outcome: &PhaseCorrelationOutcome) -> (Vec<f32>, f32) {
    let peak = refine_peak(&outcome.surface.view(), &outcome.best.surface_position);
    let shift = outcome
        .best
        .shift
        .iter()
        .zip(&peak.offset)
        .map(|(&s, &o)| s as f32 + o)
        .collect();
    (shift, peak.value)
}

fn neighbour_offsets(ndim: usize) -> Vec<Vec<isize>> {
    let total = 3usize.pow(ndim as u32);
    (0..total)
        .map(|mut k| {
            let mut offset = vec![0isize; ndim];
            for o in offset.iter_mut() {
                *o = (k % 3) as isize - 1;
                k /= 3;
            }
            offset
        })
        .filter(|offset| offset.iter().any(|&o| o != 0))
        .collect()
}

fn unravel(mut index: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0usize; shape.len()];
    for d in (0..shape.len()).rev() {
        coords[d] = index % shape[d];
        index /= shape[d];
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_candidate_shifts() {
        let shifts = candidate_shifts(&[3, 0], &[10, 8]);
        assert_eq!(shifts, vec![vec![3, 0], vec![-7, 0]]);

        let shifts = candidate_shifts(&[2, 5], &[10, 8]);
        assert_eq!(shifts.len(), 4);
        assert!(shifts.contains(&vec![-8, -3]));
    }

    #[test]
    fn test_neighbour_offsets() {
        assert_eq!(neighbour_offsets(2).len(), 8);
        assert_eq!(neighbour_offsets(3).len(), 26);
    }

    #[test]
    fn test_unravel_row_major() {
        assert_eq!(unravel(7, &[3, 4]), vec![1, 3]);
        assert_eq!(unravel(23, &[2, 3, 4]), vec![1, 2, 3]);
    }

    fn peak(shift: &[isize], cross_correlation: f32) -> PhaseCorrelationPeak {
        PhaseCorrelationPeak {
            surface_position: vec![0; shift.len()],
            shift: shift.to_vec(),
            phase_correlation: 0.1,
            cross_correlation,
            num_samples: 100,
        }
    }

    #[test]
    fn test_equal_cross_correlation_keeps_earlier_candidate() {
        let candidates = vec![peak(&[4, 1], 0.5), peak(&[7, 2], 0.8), peak(&[-3, 2], 0.8), peak(&[0, 0], 0.2)];
        let best = strongest_cross_correlation(&candidates).unwrap();
        assert_eq!(best.shift, vec![7, 2]);

        assert!(strongest_cross_correlation(&[]).is_none());
    }

    #[test]
    fn test_featureless_blocks_fall_back_to_first_candidate() {
        let flat = ArrayD::from_elem(IxDyn(&[16, 12]), 5.0f32);
        let outcome = PhaseCorrelation::new(3)
            .with_parallel(false)
            .process(&flat.view(), &flat.view())
            .unwrap();

        assert!(outcome.candidates.iter().all(|c| c.cross_correlation == 0.0));
        assert_eq!(outcome.best, outcome.candidates[0]);
    }

    #[test]
    fn test_maxima_sorted_and_limited() {
        let mut surface = ArrayD::zeros(IxDyn(&[8, 8]));
        surface[[1, 1]] = 0.5f32;
        surface[[5, 5]] = 0.9;
        surface[[3, 6]] = 0.7;
        let maxima = PhaseCorrelation::new(2).strongest_maxima(&surface);
        assert_eq!(maxima.len(), 2);
        assert_eq!(maxima[0].0, vec![5, 5]);
        assert_eq!(maxima[1].0, vec![3, 6]);
    }
}
