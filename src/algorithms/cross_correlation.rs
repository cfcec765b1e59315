use ndarray::{ArrayViewD, Slice, Zip};

/// Overlaps covering less than this share of the smaller block are not trusted.
pub const MIN_OVERLAP_FRACTION: f64 = 0.05;

/// Minimum extent of an overlap in every dimension.
pub const MIN_OVERLAP_EXTENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossCorrelation {
    /// Pearson correlation of the overlapping samples, 0 when the overlap is too small.
    pub r: f32,
    pub num_samples: usize,
}

impl CrossCorrelation {
    fn rejected(num_samples: usize) -> Self {
        Self { r: 0.0, num_samples }
    }
}

/// Pearson correlation of `first` and `second` over the overlap obtained by
/// placing `second` at `shift` relative to `first`.
pub fn test_cross_correlation(first: &ArrayViewD<f32>, second: &ArrayViewD<f32>, shift: &[isize]) -> CrossCorrelation {
    let ndim = first.ndim();
    if second.ndim() != ndim || shift.len() != ndim {
        return CrossCorrelation::rejected(0);
    }

    let mut start = Vec::with_capacity(ndim);
    let mut end = Vec::with_capacity(ndim);
    for d in 0..ndim {
        let n1 = first.shape()[d] as isize;
        let n2 = second.shape()[d] as isize;
        let lo = shift[d].max(0);
        let hi = (shift[d] + n2).min(n1);
        if hi - lo < MIN_OVERLAP_EXTENT as isize {
            return CrossCorrelation::rejected(0);
        }
        start.push(lo);
        end.push(hi);
    }

    let num_samples: usize = start.iter().zip(&end).map(|(&lo, &hi)| (hi - lo) as usize).product();
    let smaller = first.len().min(second.len());
    if (num_samples as f64) < MIN_OVERLAP_FRACTION * smaller as f64 {
        return CrossCorrelation::rejected(num_samples);
    }

    let region1 = first.slice_each_axis(|ax| {
        let d = ax.axis.index();
        Slice::from(start[d]..end[d])
    });
    let region2 = second.slice_each_axis(|ax| {
        let d = ax.axis.index();
        Slice::from((start[d] - shift[d])..(end[d] - shift[d]))
    });

    CrossCorrelation {
        r: pearson(&region1, &region2),
        num_samples,
    }
}

fn pearson(a: &ArrayViewD<f32>, b: &ArrayViewD<f32>) -> f32 {
    let n = a.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    Zip::from(a).and(b).for_each(|&x, &y| {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    });

    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    (cov / (var_a * var_b).sqrt()) as f32
}
