use serde::{Deserialize, Serialize};

use crate::error::StitchError;
use crate::optimization::InvertibleBoundable;

/// World-space box covering every transformed tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionBounds {
    /// World coordinate of output element `[0, 0(, 0)]`.
    pub offset: Vec<f64>,
    pub size: Vec<usize>,
}

impl FusionBounds {
    pub fn num_elements(&self) -> usize {
        self.size.iter().product()
    }
}

/// Union of the transformed boxes `[0, dims]` of all images.
///
/// With more models than images, model `i` belongs to image `i % images`
/// (timepoint-major ordering) and the union spans every timepoint.
pub fn estimate_bounds<M: InvertibleBoundable>(
    image_dimensions: &[Vec<usize>],
    models: &[M],
) -> crate::Result<FusionBounds> {
    let num_images = image_dimensions.len();
    if num_images == 0 || models.len() < num_images || models.len() % num_images != 0 {
        return Err(StitchError::Configuration(format!(
            "{} models cannot be assigned to {} images",
            models.len(),
            num_images
        ))
        .into());
    }

    let num_dimensions = image_dimensions[0].len();
    let mut lower = vec![f64::INFINITY; num_dimensions];
    let mut upper = vec![f64::NEG_INFINITY; num_dimensions];

    for (i, model) in models.iter().enumerate() {
        let dims = &image_dimensions[i % num_images];
        if dims.len() != num_dimensions || model.num_dimensions() != num_dimensions {
            return Err(StitchError::DimensionalityMismatch {
                first: num_dimensions,
                second: dims.len().max(model.num_dimensions()),
            }
            .into());
        }

        let mut min = vec![0.0; num_dimensions];
        let mut max: Vec<f64> = dims.iter().map(|&d| d as f64).collect();
        model.estimate_bounds(&mut min, &mut max);

        for d in 0..num_dimensions {
            lower[d] = lower[d].min(min[d]).min(max[d]);
            upper[d] = upper[d].max(min[d]).max(max[d]);
        }
    }

    if lower.iter().chain(&upper).any(|v| !v.is_finite()) {
        return Err(StitchError::NoninvertibleModel("tile bounds are not finite".into()).into());
    }

    Ok(FusionBounds {
        size: lower
            .iter()
            .zip(&upper)
            .map(|(lo, hi)| (hi - lo).round() as usize)
            .collect(),
        offset: lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::TranslationModel;

    #[test]
    fn test_union_of_shifted_tiles() {
        let dims = vec![vec![100, 50], vec![100, 50]];
        let models = vec![
            TranslationModel::from_translation(vec![0.0, 0.0]),
            TranslationModel::from_translation(vec![80.0, -10.0]),
        ];
        let bounds = estimate_bounds(&dims, &models).unwrap();
        assert_eq!(bounds.offset, vec![0.0, -10.0]);
        assert_eq!(bounds.size, vec![180, 60]);
    }

    #[test]
    fn test_models_for_several_timepoints() {
        let dims = vec![vec![10, 10], vec![20, 10]];
        let models = vec![
            TranslationModel::from_translation(vec![0.0, 0.0]),
            TranslationModel::from_translation(vec![5.0, 0.0]),
            TranslationModel::from_translation(vec![0.0, 3.0]),
            TranslationModel::from_translation(vec![7.0, 3.0]),
        ];
        let bounds = estimate_bounds(&dims, &models).unwrap();
        assert_eq!(bounds.size, vec![27, 13]);

        assert!(estimate_bounds(&dims, &models[..3]).is_err());
    }
}
