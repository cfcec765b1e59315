use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// A coordinate transform that can be inverted and can bound a transformed box.
pub trait InvertibleBoundable: Send + Sync {
    fn num_dimensions(&self) -> usize;

    /// Local to world.
    fn apply_in_place(&self, point: &mut [f64]);

    /// World to local.
    fn apply_inverse_in_place(&self, point: &mut [f64]) -> Result<(), StitchError>;

    /// Replaces `[min, max]` by the axis-aligned bounds of the transformed box.
    fn estimate_bounds(&self, min: &mut [f64], max: &mut [f64]);
}

/// Pure translation in 2D or 3D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationModel {
    translation: Vec<f64>,
}

impl TranslationModel {
    pub fn new(num_dimensions: usize) -> Self {
        Self {
            translation: vec![0.0; num_dimensions],
        }
    }

    pub fn from_translation(translation: Vec<f64>) -> Self {
        Self { translation }
    }

    pub fn translation(&self) -> &[f64] {
        &self.translation
    }

    pub fn set_translation(&mut self, translation: &[f64]) {
        self.translation.clear();
        self.translation.extend_from_slice(translation);
    }

    pub fn reset(&mut self) {
        self.translation.iter_mut().for_each(|t| *t = 0.0);
    }

    pub fn apply(&self, point: &[f64]) -> Vec<f64> {
        let mut world = point.to_vec();
        self.apply_in_place(&mut world);
        world
    }

    /// Weighted least-squares fit of `local + t = target` over `(local, target, weight)`.
    pub fn fit<'a, I>(&mut self, correspondences: I) -> Result<(), StitchError>
    where
        I: IntoIterator<Item = (&'a [f64], Vec<f64>, f64)>,
    {
        let n = self.translation.len();
        let mut sum = vec![0.0f64; n];
        let mut weight_sum = 0.0f64;

        for (local, target, weight) in correspondences {
            for d in 0..n {
                sum[d] += weight * (target[d] - local[d]);
            }
            weight_sum += weight;
        }

        if !(weight_sum > 0.0) || !weight_sum.is_finite() {
            return Err(StitchError::Numerical(format!(
                "cannot fit translation, total match weight is {}",
                weight_sum
            )));
        }

        for (t, s) in self.translation.iter_mut().zip(sum) {
            *t = s / weight_sum;
        }
        Ok(())
    }
}

impl InvertibleBoundable for TranslationModel {
    fn num_dimensions(&self) -> usize {
        self.translation.len()
    }

    fn apply_in_place(&self, point: &mut [f64]) {
        for (p, t) in point.iter_mut().zip(&self.translation) {
            *p += t;
        }
    }

    fn apply_inverse_in_place(&self, point: &mut [f64]) -> Result<(), StitchError> {
        if self.translation.iter().any(|t| !t.is_finite()) {
            return Err(StitchError::NoninvertibleModel(format!(
                "translation {:?} is not finite",
                self.translation
            )));
        }
        for (p, t) in point.iter_mut().zip(&self.translation) {
            *p -= t;
        }
        Ok(())
    }

    fn estimate_bounds(&self, min: &mut [f64], max: &mut [f64]) {
        self.apply_in_place(min);
        self.apply_in_place(max);
    }
}
