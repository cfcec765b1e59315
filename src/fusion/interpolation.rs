use ndarray::{ArrayViewD, IxDyn};

use crate::data::Sample;

/// How a tile is sampled at a real-valued position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    NearestNeighbor,
    /// N-linear, mirroring at the borders.
    Linear,
}

/// Reads one channel/timepoint of a tile at real-valued positions `[x, y, (z)]`.
///
/// Callers guarantee that every coordinate lies in `[0, dim - 1]`.
pub trait Sampler: Send + Sync {
    fn sample(&self, position: &[f64]) -> f32;
}

/// Sampler over a borrowed plane of any sample type.
pub struct PlaneSampler<'a, T> {
    data: ArrayViewD<'a, T>,
    mode: Interpolation,
}

impl<'a, T: Sample> PlaneSampler<'a, T> {
    pub fn new(data: ArrayViewD<'a, T>, mode: Interpolation) -> Self {
        Self { data, mode }
    }

    fn nearest(&self, position: &[f64]) -> f32 {
        let shape = self.data.shape();
        let mut index = [0usize; 3];
        for (d, &p) in position.iter().enumerate().take(shape.len()) {
            let max = shape[d] as f64 - 1.0;
            index[d] = p.round().clamp(0.0, max) as usize;
        }
        self.data[IxDyn(&index[..shape.len()])].to_f32()
    }

    fn linear(&self, position: &[f64]) -> f32 {
        let shape = self.data.shape();
        let ndim = shape.len();

        let mut base = [0isize; 3];
        let mut frac = [0f64; 3];
        for d in 0..ndim {
            let floor = position[d].floor();
            base[d] = floor as isize;
            frac[d] = position[d] - floor;
        }

        let mut index = [0usize; 3];
        let mut value = 0.0f64;
        for corner in 0..(1usize << ndim) {
            let mut weight = 1.0f64;
            for d in 0..ndim {
                let upper = (corner >> d) & 1 == 1;
                let offset = if upper { 1 } else { 0 };
                weight *= if upper { frac[d] } else { 1.0 - frac[d] };
                index[d] = mirror(base[d] + offset, shape[d]);
            }
            if weight != 0.0 {
                value += weight * self.data[IxDyn(&index[..ndim])].to_f32() as f64;
            }
        }
        value as f32
    }
}

impl<T: Sample> Sampler for PlaneSampler<'_, T> {
    fn sample(&self, position: &[f64]) -> f32 {
        match self.mode {
            Interpolation::NearestNeighbor => self.nearest(position),
            Interpolation::Linear => self.linear(position),
        }
    }
}

/// Reflects an index back into `[0, len)` across the nearest border.
fn mirror(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected.clamp(0, last) as usize
}
