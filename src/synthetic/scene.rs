use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{ImageData, ImageStack, Sample};
use crate::error::StitchError;

/// An isotropic Gaussian spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub center: Vec<f64>,
    pub sigma: f64,
    pub amplitude: f64,
}

/// A continuous test scene that can be sampled at any real position, so
/// tiles cut at sub-pixel offsets have an exact ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub extent: Vec<usize>,
    pub background: f32,
    pub blobs: Vec<Blob>,
}

impl Scene {
    /// `num_blobs` random blobs scattered over `extent` (2D or 3D).
    pub fn random(extent: &[usize], num_blobs: usize, seed: u64) -> crate::Result<Self> {
        if !(2..=3).contains(&extent.len()) || extent.iter().any(|&e| e == 0) {
            return Err(StitchError::Configuration(format!("invalid scene extent {:?}", extent)).into());
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let blobs = (0..num_blobs)
            .map(|_| Blob {
                center: extent.iter().map(|&e| rng.gen_range(0.0..e as f64)).collect(),
                sigma: rng.gen_range(1.5..5.0),
                amplitude: rng.gen_range(20.0..120.0),
            })
            .collect();

        Ok(Self {
            extent: extent.to_vec(),
            background: 10.0,
            blobs,
        })
    }

    pub fn num_dimensions(&self) -> usize {
        self.extent.len()
    }

    pub fn value_at(&self, position: &[f64]) -> f32 {
        let mut value = self.background as f64;
        for blob in &self.blobs {
            let reach = 4.0 * blob.sigma;
            let mut dist_sq = 0.0;
            for (p, c) in position.iter().zip(&blob.center) {
                let delta = p - c;
                if delta.abs() > reach {
                    dist_sq = f64::INFINITY;
                    break;
                }
                dist_sq += delta * delta;
            }
            if dist_sq.is_finite() {
                value += blob.amplitude * (-dist_sq / (2.0 * blob.sigma * blob.sigma)).exp();
            }
        }
        value as f32
    }

    /// Samples the window of `size` whose element `[0, 0(, 0)]` lies at `origin`.
    pub fn render(&self, origin: &[f64], size: &[usize]) -> ArrayD<f32> {
        let mut position = vec![0.0; size.len()];
        ArrayD::from_shape_fn(IxDyn(size), |index| {
            for (d, p) in position.iter_mut().enumerate() {
                *p = origin[d] + index[d] as f64;
            }
            self.value_at(&position)
        })
    }

    /// `render` converted to a single-channel tile of sample type `T`.
    pub fn render_tile<T: Sample>(&self, origin: &[f64], size: &[usize]) -> crate::Result<ImageStack<T>> {
        ImageStack::from_plane(self.render(origin, size).mapv(T::from_f32))
    }

    /// One 8-bit tile per origin.
    pub fn cut_tiles(&self, origins: &[Vec<f64>], size: &[usize]) -> crate::Result<Vec<ImageData>> {
        origins
            .iter()
            .map(|origin| Ok(ImageData::from(self.render_tile::<u8>(origin, size)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_scene() {
        let a = Scene::random(&[100, 80], 50, 7).unwrap();
        let b = Scene::random(&[100, 80], 50, 7).unwrap();
        let c = Scene::random(&[100, 80], 50, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_render_is_shift_consistent() {
        let scene = Scene::random(&[60, 60], 40, 1).unwrap();
        let whole = scene.render(&[0.0, 0.0], &[60, 60]);
        let window = scene.render(&[10.0, 5.0], &[20, 20]);
        assert_eq!(window[[0, 0]], whole[[10, 5]]);
        assert_eq!(window[[19, 19]], whole[[29, 24]]);
    }

    #[test]
    fn test_render_3d() {
        let scene = Scene::random(&[20, 20, 10], 10, 3).unwrap();
        let tile = scene.render_tile::<u16>(&[0.0, 0.0, 0.0], &[8, 6, 4]).unwrap();
        assert_eq!(tile.dimensions(), &[8, 6, 4]);
    }

    #[test]
    fn test_rejects_one_dimensional_scene() {
        assert!(Scene::random(&[100], 5, 0).is_err());
    }
}
