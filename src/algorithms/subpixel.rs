use nalgebra::{DMatrix, DVector};
use ndarray::ArrayViewD;

/// Largest correction a quadratic fit may apply per dimension.
pub const MAX_SUBPIXEL_OFFSET: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SubpixelPeak {
    pub offset: Vec<f32>,
    /// Value of the fitted quadratic at the refined location.
    pub value: f32,
}

/// Refines an integer maximum of a periodic surface by fitting a quadratic
/// through its 3^n neighbourhood (one Newton step on gradient and Hessian from
/// central differences).
///
/// A singular Hessian yields a zero offset. The offset is clamped to
/// [`MAX_SUBPIXEL_OFFSET`], so the refined peak never leaves its integer cell.
pub fn refine_peak(surface: &ArrayViewD<f32>, peak: &[usize]) -> SubpixelPeak {
    let n = surface.ndim();
    let center = value_at(surface, peak, &[]);

    let mut gradient = DVector::<f64>::zeros(n);
    let mut hessian = DMatrix::<f64>::zeros(n, n);
    for d in 0..n {
        let plus = value_at(surface, peak, &[(d, 1)]);
        let minus = value_at(surface, peak, &[(d, -1)]);
        gradient[d] = (plus - minus) / 2.0;
        hessian[(d, d)] = plus - 2.0 * center + minus;

        for e in (d + 1)..n {
            let pp = value_at(surface, peak, &[(d, 1), (e, 1)]);
            let pm = value_at(surface, peak, &[(d, 1), (e, -1)]);
            let mp = value_at(surface, peak, &[(d, -1), (e, 1)]);
            let mm = value_at(surface, peak, &[(d, -1), (e, -1)]);
            let mixed = (pp - pm - mp + mm) / 4.0;
            hessian[(d, e)] = mixed;
            hessian[(e, d)] = mixed;
        }
    }

    let step = hessian
        .clone()
        .lu()
        .solve(&(-&gradient))
        .filter(|s| s.iter().all(|v| v.is_finite()));

    match step {
        Some(step) => {
            let offset: Vec<f32> = step
                .iter()
                .map(|&v| (v as f32).clamp(-MAX_SUBPIXEL_OFFSET, MAX_SUBPIXEL_OFFSET))
                .collect();
            let delta = DVector::from_iterator(n, offset.iter().map(|&v| v as f64));
            let value = center + gradient.dot(&delta) + 0.5 * delta.dot(&(&hessian * &delta));
            SubpixelPeak {
                offset,
                value: value as f32,
            }
        }
        None => SubpixelPeak {
            offset: vec![0.0; n],
            value: center as f32,
        },
    }
}

/// Surface value at `peak` moved by `steps`, wrapping around every border.
fn value_at(surface: &ArrayViewD<f32>, peak: &[usize], steps: &[(usize, isize)]) -> f64 {
    let shape = surface.shape();
    let mut index = peak.to_vec();
    for &(d, step) in steps {
        let len = shape[d] as isize;
        index[d] = (index[d] as isize + step).rem_euclid(len) as usize;
    }
    surface[index.as_slice()] as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn paraboloid(size: [usize; 2], center: [f64; 2]) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(&size), |idx| {
            let dx = idx[0] as f64 - center[0];
            let dy = idx[1] as f64 - center[1];
            (10.0 - dx * dx - 0.5 * dy * dy - 0.2 * dx * dy) as f32
        })
    }

    #[test]
    fn test_recovers_quadratic_maximum() {
        let surface = paraboloid([9, 9], [4.3, 3.8]);
        let peak = refine_peak(&surface.view(), &[4, 4]);
        assert!((peak.offset[0] - 0.3).abs() < 1e-3);
        assert!((peak.offset[1] + 0.2).abs() < 1e-3);
        assert!((peak.value - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_flat_surface_gives_zero_offset() {
        let surface = ArrayD::from_elem(IxDyn(&[5, 5, 5]), 1.0f32);
        let peak = refine_peak(&surface.view(), &[0, 2, 4]);
        assert_eq!(peak.offset, vec![0.0, 0.0, 0.0]);
        assert_eq!(peak.value, 1.0);
    }

    #[test]
    fn test_offset_is_clamped() {
        // A ramp with a tiny curvature pushes the Newton step far outside the cell.
        let surface = ArrayD::from_shape_fn(IxDyn(&[7, 7]), |idx| {
            let x = idx[0] as f32;
            -0.01 * (x - 40.0) * (x - 40.0) - (idx[1] as f32 - 3.0).powi(2)
        });
        let peak = refine_peak(&surface.view(), &[3, 3]);
        assert_eq!(peak.offset[0], MAX_SUBPIXEL_OFFSET);
        assert!(peak.offset[1].abs() < 1e-4);
    }
}
