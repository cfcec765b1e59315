use ndarray::{ArrayD, ArrayViewD, IxDyn};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Forward n-D FFT in place, one axis at a time.
pub fn compute_fft(data: &mut ArrayD<Complex<f32>>, parallel: bool) {
    transform_axes(data, false, parallel);
}

/// Inverse n-D FFT in place, normalized by the number of elements.
pub fn compute_ifft(data: &mut ArrayD<Complex<f32>>, parallel: bool) {
    transform_axes(data, true, parallel);
    let scale = 1.0 / data.len().max(1) as f32;
    data.mapv_inplace(|v| v * scale);
}

fn transform_axes(data: &mut ArrayD<Complex<f32>>, inverse: bool, parallel: bool) {
    let mut planner = FftPlanner::new();
    let ndim = data.ndim();

    for axis in 0..ndim {
        let len = data.shape()[axis];
        if len <= 1 {
            continue;
        }
        let fft = if inverse {
            planner.plan_fft_inverse(len)
        } else {
            planner.plan_fft_forward(len)
        };

        // Move the transformed axis last so each lane is contiguous in the copy.
        let mut view = data.view_mut();
        view.swap_axes(axis, ndim - 1);
        let mut lanes: Vec<Complex<f32>> = view.iter().copied().collect();

        if parallel {
            lanes.par_chunks_mut(len).for_each(|lane| fft.process(lane));
        } else {
            for lane in lanes.chunks_mut(len) {
                fft.process(lane);
            }
        }

        for (dst, src) in view.iter_mut().zip(lanes) {
            *dst = src;
        }
    }
}

/// Share of each dimension added on both sides of a block before the transform.
pub const RELATIVE_EXTENSION: f64 = 0.25;

/// Spectral terms weaker than this fraction of the strongest term are dropped.
pub const NORMALIZATION_THRESHOLD: f32 = 1e-5;

/// Samples added on each side of every dimension for blocks of `size`.
pub fn extension_for(size: &[usize]) -> Vec<usize> {
    size.iter()
        .map(|&n| ((n as f64 * RELATIVE_EXTENSION).ceil() as usize).max(1))
        .collect()
}

/// Places `image` at `extension` inside a block of `size` and fills the rest
/// with a mirrored copy that fades to the image mean over `extension` samples.
///
/// Both inputs of a phase correlation must use the same `extension`, so the
/// peak positions are not offset.
pub fn extend_mirror_fading(image: &ArrayViewD<f32>, size: &[usize], extension: &[usize]) -> ArrayD<Complex<f32>> {
    let mean = if image.is_empty() {
        0.0
    } else {
        image.iter().map(|&v| v as f64).sum::<f64>() / image.len() as f64
    } as f32;
    let shape = image.shape().to_vec();
    let ndim = shape.len();

    ArrayD::from_shape_fn(IxDyn(size), |index| {
        let mut source = Vec::with_capacity(ndim);
        let mut weight = 1.0f32;
        for d in 0..ndim {
            let local = index[d] as isize - extension[d] as isize;
            let n = shape[d] as isize;
            let distance = if local < 0 {
                -local
            } else if local >= n {
                local - n + 1
            } else {
                0
            };
            weight *= fade(distance as usize, extension[d]);
            if weight == 0.0 {
                return Complex::new(mean, 0.0);
            }
            source.push(mirror(local, shape[d]));
        }
        let value = image[&source[..]];
        Complex::new(mean + (value - mean) * weight, 0.0)
    })
}

/// Cosine fall-off from 1 at the image border to 0 at `length` samples out.
fn fade(distance: usize, length: usize) -> f32 {
    if distance == 0 {
        1.0
    } else if distance >= length {
        0.0
    } else {
        0.5 * (1.0 + (std::f32::consts::PI * distance as f32 / length as f32).cos())
    }
}

/// Mirror index into `0..n`, edge samples repeated.
fn mirror(position: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let period = 2 * n as isize;
    let m = position.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}

/// Scales every term to unit magnitude. Terms weaker than
/// [`NORMALIZATION_THRESHOLD`] times the strongest term become zero.
pub fn normalize_spectrum(spectrum: &mut ArrayD<Complex<f32>>) {
    let strongest = spectrum.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
    let threshold = strongest * NORMALIZATION_THRESHOLD;
    spectrum.mapv_inplace(|c| {
        let magnitude = c.norm();
        if magnitude > threshold && magnitude > 0.0 {
            c / magnitude
        } else {
            Complex::new(0.0, 0.0)
        }
    });
}

/// Cross-power spectrum `F1 * conj(F2)` of the two normalized spectra.
pub fn cross_power_spectrum(fft1: &ArrayD<Complex<f32>>, fft2: &ArrayD<Complex<f32>>) -> ArrayD<Complex<f32>> {
    let mut first = fft1.clone();
    let mut second = fft2.clone();
    normalize_spectrum(&mut first);
    normalize_spectrum(&mut second);
    first.zip_mut_with(&second, |a, &b| *a *= b.conj());
    first
}
