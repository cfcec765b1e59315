use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::StitchError;

/// Adds zero-mean Gaussian noise with standard deviation `sigma`.
pub fn add_gaussian_noise(data: &mut ArrayD<f32>, sigma: f32, seed: u64) -> crate::Result<()> {
    if !(sigma >= 0.0) {
        return Err(StitchError::Configuration(format!("noise sigma must be >= 0, got {}", sigma)).into());
    }
    let normal = Normal::new(0.0f32, sigma)
        .map_err(|e| StitchError::Configuration(format!("invalid noise sigma {}: {}", sigma, e)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    data.mapv_inplace(|v| v + normal.sample(&mut rng));
    Ok(())
}
