use std::borrow::Cow;

use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};

use super::{PixelType, Rect, Sample};
use crate::error::StitchError;
use crate::fusion::{Interpolation, PlaneSampler, Sampler};
use crate::Result;

/// Read access to the pixels of one tile.
///
/// Dimensions are ordered `[x, y]` or `[x, y, z]`. Channels and timepoints are
/// 1-based; channel 0 asks for the average over all channels.
pub trait PixelBlockAccess: Send + Sync {
    fn pixel_type(&self) -> PixelType;

    fn dimensions(&self) -> &[usize];

    fn num_channels(&self) -> usize;

    fn num_timepoints(&self) -> usize;

    fn num_dimensions(&self) -> usize {
        self.dimensions().len()
    }

    /// The block for one channel and timepoint as `f32`, cropped to `roi`.
    /// Borrowed when the tile already stores a single float channel and no
    /// crop is requested.
    fn block(&self, channel: usize, timepoint: usize, roi: Option<&Rect>) -> Result<Cow<'_, ArrayD<f32>>>;

    /// A sampler over one channel (1-based, no averaging) and timepoint.
    fn sampler(&self, channel: usize, timepoint: usize, mode: Interpolation) -> Result<Box<dyn Sampler + '_>>;
}

/// A multi-channel, multi-timepoint stack of equally sized planes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStack<T> {
    dimensions: Vec<usize>,
    num_channels: usize,
    num_timepoints: usize,
    /// Indexed `(timepoint - 1) * num_channels + (channel - 1)`.
    planes: Vec<ArrayD<T>>,
}

impl<T: Sample> ImageStack<T> {
    /// A zero-filled stack.
    pub fn new(dimensions: Vec<usize>, num_channels: usize, num_timepoints: usize) -> Result<Self> {
        check_layout(&dimensions, num_channels, num_timepoints)?;
        let planes = (0..num_channels * num_timepoints)
            .map(|_| ArrayD::from_elem(IxDyn(&dimensions), T::default()))
            .collect();
        Ok(Self {
            dimensions,
            num_channels,
            num_timepoints,
            planes,
        })
    }

    pub fn from_planes(
        num_channels: usize,
        num_timepoints: usize,
        planes: Vec<ArrayD<T>>,
    ) -> Result<Self> {
        let dimensions = planes
            .first()
            .map(|p| p.shape().to_vec())
            .ok_or_else(|| StitchError::Configuration("image stack needs at least one plane".into()))?;
        check_layout(&dimensions, num_channels, num_timepoints)?;
        if planes.len() != num_channels * num_timepoints {
            return Err(StitchError::Configuration(format!(
                "expected {} planes for {} channels x {} timepoints, got {}",
                num_channels * num_timepoints,
                num_channels,
                num_timepoints,
                planes.len()
            ))
            .into());
        }
        if let Some(plane) = planes.iter().find(|p| p.shape() != dimensions.as_slice()) {
            return Err(StitchError::Configuration(format!(
                "plane shape {:?} differs from {:?}",
                plane.shape(),
                dimensions
            ))
            .into());
        }
        Ok(Self {
            dimensions,
            num_channels,
            num_timepoints,
            planes,
        })
    }

    /// Single channel, single timepoint.
    pub fn from_plane(plane: ArrayD<T>) -> Result<Self> {
        Self::from_planes(1, 1, vec![plane])
    }

    fn plane_index(&self, channel: usize, timepoint: usize) -> Result<usize> {
        if channel == 0 || channel > self.num_channels {
            return Err(StitchError::BlockUnavailable {
                channel,
                timepoint,
                reason: format!("tile has {} channel(s)", self.num_channels),
            }
            .into());
        }
        if timepoint == 0 || timepoint > self.num_timepoints {
            return Err(StitchError::BlockUnavailable {
                channel,
                timepoint,
                reason: format!("tile has {} timepoint(s)", self.num_timepoints),
            }
            .into());
        }
        Ok((timepoint - 1) * self.num_channels + (channel - 1))
    }

    pub fn plane(&self, channel: usize, timepoint: usize) -> Result<&ArrayD<T>> {
        let index = self.plane_index(channel, timepoint)?;
        Ok(&self.planes[index])
    }

    pub fn plane_mut(&mut self, channel: usize, timepoint: usize) -> Result<&mut ArrayD<T>> {
        let index = self.plane_index(channel, timepoint)?;
        Ok(&mut self.planes[index])
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_timepoints(&self) -> usize {
        self.num_timepoints
    }

    fn cropped<'a>(&self, plane: &'a ArrayD<T>, roi: Option<&Rect>) -> ArrayViewD<'a, T> {
        match roi {
            Some(rect) => plane.slice_each_axis(|axis| match axis.axis.index() {
                0 => Slice::from(rect.x..rect.x + rect.width),
                1 => Slice::from(rect.y..rect.y + rect.height),
                _ => Slice::from(..),
            }),
            None => plane.view(),
        }
    }

    /// Converts (and for channel 0 averages) into a fresh `f32` block.
    pub fn block_f32(&self, channel: usize, timepoint: usize, roi: Option<&Rect>) -> Result<ArrayD<f32>> {
        if let Some(rect) = roi {
            if !rect.fits(&self.dimensions) {
                return Err(StitchError::BlockUnavailable {
                    channel,
                    timepoint,
                    reason: format!("region {:?} outside tile {:?}", rect, self.dimensions),
                }
                .into());
            }
        }

        if channel != 0 {
            let plane = self.plane(channel, timepoint)?;
            return Ok(self.cropped(plane, roi).mapv(T::to_f32));
        }

        let mut sum: Option<ArrayD<f32>> = None;
        for c in 1..=self.num_channels {
            let plane = self.plane(c, timepoint)?;
            let view = self.cropped(plane, roi);
            match sum.as_mut() {
                Some(acc) => acc.zip_mut_with(&view, |a, &v| *a += v.to_f32()),
                None => sum = Some(view.mapv(T::to_f32)),
            }
        }
        let mut averaged = sum.ok_or_else(|| StitchError::BlockUnavailable {
            channel,
            timepoint,
            reason: "tile has no channels".into(),
        })?;
        let n = self.num_channels as f32;
        averaged.mapv_inplace(|v| v / n);
        Ok(averaged)
    }
}

fn check_layout(dimensions: &[usize], num_channels: usize, num_timepoints: usize) -> Result<()> {
    if !(2..=3).contains(&dimensions.len()) {
        return Err(StitchError::Configuration(format!(
            "tiles must be 2D or 3D, got {} dimensions",
            dimensions.len()
        ))
        .into());
    }
    if dimensions.iter().any(|&d| d == 0) {
        return Err(StitchError::Configuration(format!("empty tile extent {:?}", dimensions)).into());
    }
    if num_channels == 0 || num_timepoints == 0 {
        return Err(StitchError::Configuration("a tile needs at least one channel and one timepoint".into()).into());
    }
    Ok(())
}

/// A tile in its native pixel type.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(ImageStack<u8>),
    U16(ImageStack<u16>),
    F32(ImageStack<f32>),
}

impl ImageData {
    /// Zero-filled data of a given type.
    pub fn blank(
        pixel_type: PixelType,
        dimensions: Vec<usize>,
        num_channels: usize,
        num_timepoints: usize,
    ) -> Result<Self> {
        Ok(match pixel_type {
            PixelType::U8 => ImageData::U8(ImageStack::new(dimensions, num_channels, num_timepoints)?),
            PixelType::U16 => ImageData::U16(ImageStack::new(dimensions, num_channels, num_timepoints)?),
            PixelType::F32 => ImageData::F32(ImageStack::new(dimensions, num_channels, num_timepoints)?),
        })
    }
}

impl From<ImageStack<u8>> for ImageData {
    fn from(stack: ImageStack<u8>) -> Self {
        ImageData::U8(stack)
    }
}

impl From<ImageStack<u16>> for ImageData {
    fn from(stack: ImageStack<u16>) -> Self {
        ImageData::U16(stack)
    }
}

impl From<ImageStack<f32>> for ImageData {
    fn from(stack: ImageStack<f32>) -> Self {
        ImageData::F32(stack)
    }
}

impl PixelBlockAccess for ImageData {
    fn pixel_type(&self) -> PixelType {
        match self {
            ImageData::U8(_) => PixelType::U8,
            ImageData::U16(_) => PixelType::U16,
            ImageData::F32(_) => PixelType::F32,
        }
    }

    fn dimensions(&self) -> &[usize] {
        match self {
            ImageData::U8(s) => s.dimensions(),
            ImageData::U16(s) => s.dimensions(),
            ImageData::F32(s) => s.dimensions(),
        }
    }

    fn num_channels(&self) -> usize {
        match self {
            ImageData::U8(s) => s.num_channels(),
            ImageData::U16(s) => s.num_channels(),
            ImageData::F32(s) => s.num_channels(),
        }
    }

    fn num_timepoints(&self) -> usize {
        match self {
            ImageData::U8(s) => s.num_timepoints(),
            ImageData::U16(s) => s.num_timepoints(),
            ImageData::F32(s) => s.num_timepoints(),
        }
    }

    fn block(&self, channel: usize, timepoint: usize, roi: Option<&Rect>) -> Result<Cow<'_, ArrayD<f32>>> {
        match self {
            ImageData::F32(s) if channel != 0 && roi.is_none() => Ok(Cow::Borrowed(s.plane(channel, timepoint)?)),
            ImageData::F32(s) => Ok(Cow::Owned(s.block_f32(channel, timepoint, roi)?)),
            ImageData::U16(s) => Ok(Cow::Owned(s.block_f32(channel, timepoint, roi)?)),
            ImageData::U8(s) => Ok(Cow::Owned(s.block_f32(channel, timepoint, roi)?)),
        }
    }

    fn sampler(&self, channel: usize, timepoint: usize, mode: Interpolation) -> Result<Box<dyn Sampler + '_>> {
        Ok(match self {
            ImageData::U8(s) => Box::new(PlaneSampler::new(s.plane(channel, timepoint)?.view(), mode)),
            ImageData::U16(s) => Box::new(PlaneSampler::new(s.plane(channel, timepoint)?.view(), mode)),
            ImageData::F32(s) => Box::new(PlaneSampler::new(s.plane(channel, timepoint)?.view(), mode)),
        })
    }
}

/// One timepoint of a tile presented as a single-timepoint tile.
pub struct TimepointView<'a> {
    image: &'a dyn PixelBlockAccess,
    timepoint: usize,
}

impl<'a> TimepointView<'a> {
    pub fn new(image: &'a dyn PixelBlockAccess, timepoint: usize) -> Self {
        Self { image, timepoint }
    }

    fn source_timepoint(&self, timepoint: usize) -> Result<usize> {
        if timepoint == 1 {
            Ok(self.timepoint)
        } else {
            Err(StitchError::BlockUnavailable {
                channel: 0,
                timepoint,
                reason: "view holds a single timepoint".into(),
            }
            .into())
        }
    }
}

impl PixelBlockAccess for TimepointView<'_> {
    fn pixel_type(&self) -> PixelType {
        self.image.pixel_type()
    }

    fn dimensions(&self) -> &[usize] {
        self.image.dimensions()
    }

    fn num_channels(&self) -> usize {
        self.image.num_channels()
    }

    fn num_timepoints(&self) -> usize {
        1
    }

    fn block(&self, channel: usize, timepoint: usize, roi: Option<&Rect>) -> Result<Cow<'_, ArrayD<f32>>> {
        self.image.block(channel, self.source_timepoint(timepoint)?, roi)
    }

    fn sampler(&self, channel: usize, timepoint: usize, mode: Interpolation) -> Result<Box<dyn Sampler + '_>> {
        self.image.sampler(channel, self.source_timepoint(timepoint)?, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel_stack() -> ImageStack<u8> {
        let red = ArrayD::from_shape_fn(IxDyn(&[4, 3]), |idx| (idx[0] * 10) as u8);
        let green = ArrayD::from_elem(IxDyn(&[4, 3]), 20u8);
        ImageStack::from_planes(2, 1, vec![red, green]).unwrap()
    }

    #[test]
    fn test_channel_zero_averages() {
        let data = ImageData::from(two_channel_stack());
        let block = data.block(0, 1, None).unwrap();
        assert_eq!(block[[0, 0]], 10.0);
        assert_eq!(block[[3, 2]], 25.0);
    }

    #[test]
    fn test_roi_crop() {
        let data = ImageData::from(two_channel_stack());
        let roi = Rect::new(1, 1, 2, 2);
        let block = data.block(1, 1, Some(&roi)).unwrap();
        assert_eq!(block.shape(), &[2, 2]);
        assert_eq!(block[[0, 0]], 10.0);
        assert_eq!(block[[1, 1]], 20.0);
    }

    #[test]
    fn test_float_single_channel_is_borrowed() {
        let plane = ArrayD::from_elem(IxDyn(&[5, 5]), 1.5f32);
        let data = ImageData::from(ImageStack::from_plane(plane).unwrap());
        assert!(matches!(data.block(1, 1, None).unwrap(), Cow::Borrowed(_)));
        assert!(matches!(data.block(1, 1, Some(&Rect::new(0, 0, 2, 2))).unwrap(), Cow::Owned(_)));
    }

    #[test]
    fn test_missing_timepoint_is_reported() {
        let data = ImageData::from(two_channel_stack());
        let err = data.block(1, 2, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StitchError>(),
            Some(StitchError::BlockUnavailable { timepoint: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_one_dimensional_planes() {
        let plane = ArrayD::from_elem(IxDyn(&[8]), 0u16);
        assert!(ImageStack::from_plane(plane).is_err());
    }

    #[test]
    fn test_timepoint_view() {
        let first = ArrayD::from_elem(IxDyn(&[2, 2]), 1u8);
        let second = ArrayD::from_elem(IxDyn(&[2, 2]), 7u8);
        let data = ImageData::from(ImageStack::from_planes(1, 2, vec![first, second]).unwrap());

        let view = TimepointView::new(&data, 2);
        assert_eq!(view.num_timepoints(), 1);
        assert_eq!(view.block(1, 1, None).unwrap()[[0, 0]], 7.0);
        assert!(view.block(1, 2, None).is_err());
    }
}
