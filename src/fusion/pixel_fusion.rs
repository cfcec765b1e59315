use std::f64::consts::PI;

use crate::config::FusionMethod;

/// Share of each tile extent over which linear blending fades in.
pub const BLENDING_FRACTION: f64 = 0.2;

/// Combines the samples that several tiles contribute to one output element.
///
/// Each worker clones its own instance from a shared prototype; `clear` is
/// called before every element.
pub trait PixelFusion: Send + Sync {
    fn clear(&mut self);

    /// `image` indexes the input images, `local_position` is the sample
    /// position inside that image.
    fn add_value(&mut self, value: f32, image: usize, local_position: &[f64]);

    /// The fused value, 0 when nothing was added.
    fn value(&self) -> f32;

    fn boxed_clone(&self) -> Box<dyn PixelFusion>;
}

/// The combiner for a method, or `None` for methods that do not combine
/// samples (overlay, positions only).
pub fn pixel_fusion_for(method: FusionMethod, image_dimensions: &[Vec<usize>]) -> Option<Box<dyn PixelFusion>> {
    match method {
        FusionMethod::LinearBlending => Some(Box::new(BlendingPixelFusion::new(image_dimensions.to_vec()))),
        FusionMethod::Average => Some(Box::new(AveragePixelFusion::default())),
        FusionMethod::Median => Some(Box::new(MedianPixelFusion::default())),
        FusionMethod::Max => Some(Box::new(MaxPixelFusion::default())),
        FusionMethod::Min => Some(Box::new(MinPixelFusion::default())),
        FusionMethod::Overlay | FusionMethod::None => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AveragePixelFusion {
    sum: f64,
    count: usize,
}

impl PixelFusion for AveragePixelFusion {
    fn clear(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    fn add_value(&mut self, value: f32, _image: usize, _local_position: &[f64]) {
        self.sum += value as f64;
        self.count += 1;
    }

    fn value(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }

    fn boxed_clone(&self) -> Box<dyn PixelFusion> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MedianPixelFusion {
    values: Vec<f32>,
}

impl PixelFusion for MedianPixelFusion {
    fn clear(&mut self) {
        self.values.clear();
    }

    fn add_value(&mut self, value: f32, _image: usize, _local_position: &[f64]) {
        self.values.push(value);
    }

    fn value(&self) -> f32 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        }
    }

    fn boxed_clone(&self) -> Box<dyn PixelFusion> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaxPixelFusion {
    max: Option<f32>,
}

impl PixelFusion for MaxPixelFusion {
    fn clear(&mut self) {
        self.max = None;
    }

    fn add_value(&mut self, value: f32, _image: usize, _local_position: &[f64]) {
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn value(&self) -> f32 {
        self.max.unwrap_or(0.0)
    }

    fn boxed_clone(&self) -> Box<dyn PixelFusion> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MinPixelFusion {
    min: Option<f32>,
}

impl PixelFusion for MinPixelFusion {
    fn clear(&mut self) {
        self.min = None;
    }

    fn add_value(&mut self, value: f32, _image: usize, _local_position: &[f64]) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
    }

    fn value(&self) -> f32 {
        self.min.unwrap_or(0.0)
    }

    fn boxed_clone(&self) -> Box<dyn PixelFusion> {
        Box::new(self.clone())
    }
}

/// Weighted average whose weights fall off smoothly towards tile borders.
#[derive(Debug, Clone)]
pub struct BlendingPixelFusion {
    image_dimensions: Vec<Vec<usize>>,
    fraction: f64,
    weighted_sum: f64,
    weight_sum: f64,
}

impl BlendingPixelFusion {
    pub fn new(image_dimensions: Vec<Vec<usize>>) -> Self {
        Self::with_fraction(image_dimensions, BLENDING_FRACTION)
    }

    pub fn with_fraction(image_dimensions: Vec<Vec<usize>>, fraction: f64) -> Self {
        Self {
            image_dimensions,
            fraction,
            weighted_sum: 0.0,
            weight_sum: 0.0,
        }
    }
}

/// Blending weight of a sample at `location` inside a tile of `dimensions`:
/// 1 in the interior, falling along a cosine to near 0 within `fraction / 2`
/// of the extent from any border. Never exactly 0.
pub fn blending_weight(location: &[f64], dimensions: &[usize], fraction: f64) -> f64 {
    let mut min_distance = 1.0f64;

    for (d, &dim) in dimensions.iter().enumerate() {
        let last = dim.saturating_sub(1) as f64;
        let local = location[d].round();
        let distance = local.min(last - local).max(1.0);
        let blend_area = (fraction * 0.5 * dim as f64).round();

        if distance < blend_area {
            min_distance *= distance / blend_area;
        }
    }

    if min_distance >= 1.0 {
        1.0
    } else if min_distance <= 0.0 {
        0.000_000_1
    } else {
        ((1.0 - min_distance) * PI).cos() * 0.5 + 0.5
    }
}

impl PixelFusion for BlendingPixelFusion {
    fn clear(&mut self) {
        self.weighted_sum = 0.0;
        self.weight_sum = 0.0;
    }

    fn add_value(&mut self, value: f32, image: usize, local_position: &[f64]) {
        let weight = blending_weight(local_position, &self.image_dimensions[image], self.fraction);
        self.weighted_sum += weight * value as f64;
        self.weight_sum += weight;
    }

    fn value(&self) -> f32 {
        if self.weight_sum <= 0.0 {
            0.0
        } else {
            (self.weighted_sum / self.weight_sum) as f32
        }
    }

    fn boxed_clone(&self) -> Box<dyn PixelFusion> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fuse(fusion: &mut dyn PixelFusion, values: &[f32]) -> f32 {
        fusion.clear();
        for (i, &v) in values.iter().enumerate() {
            fusion.add_value(v, i, &[50.0, 50.0]);
        }
        fusion.value()
    }

    #[test]
    fn test_simple_methods() {
        let values = [4.0, 1.0, 10.0, 3.0];
        assert_eq!(fuse(&mut AveragePixelFusion::default(), &values), 4.5);
        assert_eq!(fuse(&mut MedianPixelFusion::default(), &values), 3.5);
        assert_eq!(fuse(&mut MedianPixelFusion::default(), &values[..3]), 4.0);
        assert_eq!(fuse(&mut MaxPixelFusion::default(), &values), 10.0);
        assert_eq!(fuse(&mut MinPixelFusion::default(), &values), 1.0);
    }

    #[test]
    fn test_empty_element_is_background() {
        assert_eq!(fuse(&mut AveragePixelFusion::default(), &[]), 0.0);
        assert_eq!(fuse(&mut MaxPixelFusion::default(), &[]), 0.0);
        let mut blending = BlendingPixelFusion::new(vec![vec![100, 100]]);
        assert_eq!(fuse(&mut blending, &[]), 0.0);
    }

    #[test]
    fn test_blending_weight_profile() {
        let dims = [100, 100];
        assert_eq!(blending_weight(&[50.0, 50.0], &dims, 0.2), 1.0);
        assert_eq!(blending_weight(&[10.0, 50.0], &dims, 0.2), 1.0);

        let edge = blending_weight(&[0.0, 50.0], &dims, 0.2);
        let near = blending_weight(&[5.0, 50.0], &dims, 0.2);
        assert!(edge > 0.0 && edge < near && near < 1.0);
        assert!((near - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_blending_prefers_tile_interior() {
        let mut fusion = BlendingPixelFusion::new(vec![vec![100, 100], vec![100, 100]]);
        fusion.add_value(10.0, 0, &[50.0, 50.0]);
        fusion.add_value(20.0, 1, &[1.0, 50.0]);
        let value = fusion.value();
        assert!(value > 10.0 && value < 12.0);
    }
}
