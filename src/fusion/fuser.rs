use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ndarray::ArrayD;
use tracing::{debug, info, warn};

use super::bounds::{estimate_bounds, FusionBounds};
use super::interpolation::{Interpolation, Sampler};
use super::pixel_fusion::{pixel_fusion_for, AveragePixelFusion, PixelFusion};
use crate::config::{FusionMethod, StitchingParameters};
use crate::data::{ImageData, ImageStack, PixelBlockAccess, PixelType, Sample};
use crate::error::StitchError;
use crate::optimization::InvertibleBoundable;
use crate::utils::{available_workers, for_each_chunk};

/// A composite image and where it sits in world coordinates.
#[derive(Debug, Clone)]
pub struct FusedImage {
    pub data: ImageData,
    pub bounds: FusionBounds,
}

/// Composites tiles placed by translation models into one image.
#[derive(Debug, Clone)]
pub struct Fuser {
    method: FusionMethod,
    interpolation: Interpolation,
    workers: usize,
}

/// One tile feeding an output plane: its index and sampler.
type Contributor<'a> = (usize, Box<dyn Sampler + 'a>);

impl Fuser {
    pub fn new(method: FusionMethod, interpolation: Interpolation) -> Self {
        Self {
            method,
            interpolation,
            workers: available_workers(),
        }
    }

    /// Linear interpolation when sub-pixel positions were requested, nearest
    /// neighbour otherwise.
    pub fn from_params(params: &StitchingParameters) -> Self {
        let interpolation = if params.subpixel_accuracy {
            Interpolation::Linear
        } else {
            Interpolation::NearestNeighbor
        };
        Self::new(params.fusion_method, interpolation)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn method(&self) -> FusionMethod {
        self.method
    }

    /// Fuses `images` placed by `models`.
    ///
    /// `models` holds one model per image, or `images.len() * timepoints`
    /// models ordered timepoint-major; timepoint `t` of every image is then
    /// placed by `models[(t - 1) * images.len()..t * images.len()]`.
    ///
    /// Returns `None` for [`FusionMethod::None`].
    pub fn fuse<M: InvertibleBoundable>(
        &self,
        images: &[&dyn PixelBlockAccess],
        models: &[M],
    ) -> crate::Result<Option<FusedImage>> {
        if self.method == FusionMethod::None {
            debug!("Fusion method is none, keeping positions only");
            return Ok(None);
        }
        if images.is_empty() {
            return Err(StitchError::Configuration("nothing to fuse".into()).into());
        }

        let start = Instant::now();
        let dimensions: Vec<Vec<usize>> = images.iter().map(|image| image.dimensions().to_vec()).collect();
        let bounds = estimate_bounds(&dimensions, models)?;
        let num_timepoints = models.len() / images.len();

        let pixel_type = PixelType::widest(images.iter().map(|image| image.pixel_type()))
            .ok_or_else(|| StitchError::UnsupportedPixelType("no input images".into()))?;

        debug!(
            "Fusing {} image(s) x {} timepoint(s) into {:?} at {:?} as {}",
            images.len(),
            num_timepoints,
            bounds.size,
            bounds.offset,
            pixel_type.name()
        );

        let data = match pixel_type {
            PixelType::U8 => ImageData::U8(self.fuse_stack(images, &dimensions, models, &bounds, num_timepoints)?),
            PixelType::U16 => ImageData::U16(self.fuse_stack(images, &dimensions, models, &bounds, num_timepoints)?),
            PixelType::F32 => ImageData::F32(self.fuse_stack(images, &dimensions, models, &bounds, num_timepoints)?),
        };

        info!(
            method = self.method.name(),
            elements = bounds.num_elements(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Fusion complete"
        );

        Ok(Some(FusedImage { data, bounds }))
    }

    /// Output channels as lists of `(image, channel)` sources. Overlay gives
    /// every channel of every image its own output channel.
    fn channel_sources(&self, images: &[&dyn PixelBlockAccess]) -> crate::Result<Vec<Vec<(usize, usize)>>> {
        if self.method == FusionMethod::Overlay {
            return Ok(images
                .iter()
                .enumerate()
                .flat_map(|(i, image)| (1..=image.num_channels()).map(move |c| vec![(i, c)]))
                .collect());
        }

        let num_channels = images[0].num_channels();
        if let Some(other) = images.iter().find(|image| image.num_channels() != num_channels) {
            return Err(StitchError::Configuration(format!(
                "cannot fuse images with {} and {} channels, use overlay",
                num_channels,
                other.num_channels()
            ))
            .into());
        }

        Ok((1..=num_channels)
            .map(|c| (0..images.len()).map(|i| (i, c)).collect())
            .collect())
    }

    fn fuse_stack<T: Sample, M: InvertibleBoundable>(
        &self,
        images: &[&dyn PixelBlockAccess],
        dimensions: &[Vec<usize>],
        models: &[M],
        bounds: &FusionBounds,
        num_timepoints: usize,
    ) -> crate::Result<ImageStack<T>> {
        let sources = self.channel_sources(images)?;
        let mut stack = ImageStack::<T>::new(bounds.size.clone(), sources.len(), num_timepoints)?;
        let num_images = images.len();

        for timepoint in 1..=num_timepoints {
            let timepoint_models = &models[(timepoint - 1) * num_images..timepoint * num_images];

            for (output_channel, contributors) in sources.iter().enumerate() {
                let samplers = contributors
                    .iter()
                    .map(|&(image, channel)| {
                        Ok((image, images[image].sampler(channel, timepoint, self.interpolation)?))
                    })
                    .collect::<crate::Result<Vec<Contributor<'_>>>>()?;

                let plane = stack.plane_mut(output_channel + 1, timepoint)?;
                self.fuse_plane(&samplers, dimensions, timepoint_models, bounds, plane)?;
            }
        }

        Ok(stack)
    }

    /// Fills one output plane. Each worker owns a contiguous run of output
    /// elements; elements no tile covers keep the background value.
    fn fuse_plane<T: Sample, M: InvertibleBoundable>(
        &self,
        contributors: &[Contributor<'_>],
        dimensions: &[Vec<usize>],
        models: &[M],
        bounds: &FusionBounds,
        plane: &mut ArrayD<T>,
    ) -> crate::Result<()> {
        let prototype: Box<dyn PixelFusion> =
            pixel_fusion_for(self.method, dimensions).unwrap_or_else(|| Box::new(AveragePixelFusion::default()));

        let output = plane
            .as_slice_mut()
            .ok_or_else(|| StitchError::Numerical("fused plane is not contiguous".into()))?;

        let size = &bounds.size;
        let offset = &bounds.offset;
        let num_dimensions = size.len();
        let warned = AtomicBool::new(false);

        for_each_chunk(output, self.workers, |start, chunk| {
            let mut fusion = prototype.boxed_clone();
            let mut world = vec![0.0f64; num_dimensions];
            let mut local = vec![0.0f64; num_dimensions];

            for (k, element) in chunk.iter_mut().enumerate() {
                world_position(start + k, size, offset, &mut world);
                fusion.clear();
                let mut covered = false;

                for (image, sampler) in contributors {
                    local.copy_from_slice(&world);
                    if let Err(err) = models[*image].apply_inverse_in_place(&mut local) {
                        if !warned.swap(true, Ordering::Relaxed) {
                            warn!("Skipping tile {} during fusion: {}", image, err);
                        }
                        continue;
                    }
                    if inside(&local, &dimensions[*image]) {
                        fusion.add_value(sampler.sample(&local), *image, &local);
                        covered = true;
                    }
                }

                if covered {
                    *element = T::from_f32(fusion.value());
                }
            }
        });

        Ok(())
    }
}

/// World coordinate of the `index`-th element of a row-major block.
fn world_position(mut index: usize, size: &[usize], offset: &[f64], world: &mut [f64]) {
    for d in (0..size.len()).rev() {
        world[d] = (index % size[d]) as f64 + offset[d];
        index /= size[d];
    }
}

fn inside(local: &[f64], dimensions: &[usize]) -> bool {
    local
        .iter()
        .zip(dimensions)
        .all(|(&l, &dim)| l >= 0.0 && l <= (dim - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::TranslationModel;
    use ndarray::IxDyn;

    fn constant(value: u8, size: [usize; 2]) -> ImageData {
        ImageData::from(ImageStack::from_plane(ArrayD::from_elem(IxDyn(&size), value)).unwrap())
    }

    #[test]
    fn test_world_position_is_row_major() {
        let mut world = vec![0.0; 2];
        world_position(7, &[4, 3], &[10.0, -2.0], &mut world);
        assert_eq!(world, vec![12.0, -1.0]);
    }

    #[test]
    fn test_gap_stays_background() {
        let a = constant(100, [4, 4]);
        let b = constant(200, [4, 4]);
        let models = vec![
            TranslationModel::from_translation(vec![0.0, 0.0]),
            TranslationModel::from_translation(vec![6.0, 0.0]),
        ];
        let fused = Fuser::new(FusionMethod::Max, Interpolation::NearestNeighbor)
            .with_workers(3)
            .fuse(&[&a, &b], &models)
            .unwrap()
            .unwrap();

        let ImageData::U8(stack) = &fused.data else {
            panic!("expected 8-bit output");
        };
        let plane = stack.plane(1, 1).unwrap();
        assert_eq!(plane.shape(), &[10, 4]);
        assert_eq!(plane[[0, 0]], 100);
        assert_eq!(plane[[4, 2]], 0);
        assert_eq!(plane[[5, 2]], 0);
        assert_eq!(plane[[9, 3]], 200);
    }

    #[test]
    fn test_overlay_keeps_images_apart() {
        let a = constant(10, [3, 3]);
        let b = constant(20, [3, 3]);
        let models = vec![
            TranslationModel::from_translation(vec![0.0, 0.0]),
            TranslationModel::from_translation(vec![1.0, 1.0]),
        ];
        let fused = Fuser::new(FusionMethod::Overlay, Interpolation::NearestNeighbor)
            .fuse(&[&a, &b], &models)
            .unwrap()
            .unwrap();

        assert_eq!(fused.data.num_channels(), 2);
        let first = fused.data.block(1, 1, None).unwrap();
        let second = fused.data.block(2, 1, None).unwrap();
        assert_eq!(first[[1, 1]], 10.0);
        assert_eq!(second[[1, 1]], 20.0);
        assert_eq!(first[[3, 3]], 0.0);
        assert_eq!(second[[0, 0]], 0.0);
    }

    #[test]
    fn test_none_produces_no_image() {
        let a = constant(1, [2, 2]);
        let models = vec![TranslationModel::new(2)];
        let fused = Fuser::new(FusionMethod::None, Interpolation::Linear).fuse(&[&a], &models).unwrap();
        assert!(fused.is_none());
    }
}
