use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma};
use ndarray::{ArrayD, IxDyn};

use super::{ImageData, ImageStack, PixelBlockAccess, Sample};
use crate::error::StitchError;

/// Loads a 2D image file as a single-timepoint tile, keeping its native depth.
/// Colour images become three channels; alpha is dropped.
pub fn load_image<P: AsRef<Path>>(path: P) -> crate::Result<ImageData> {
    let img = image::open(path.as_ref())?;
    from_dynamic_image(img)
}

pub fn from_dynamic_image(img: DynamicImage) -> crate::Result<ImageData> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    match img {
        DynamicImage::ImageLuma8(buf) => planes_from_raw(buf.as_raw(), width, height, 1, 1).map(ImageData::U8),
        DynamicImage::ImageLumaA8(buf) => planes_from_raw(buf.as_raw(), width, height, 2, 1).map(ImageData::U8),
        DynamicImage::ImageRgb8(buf) => planes_from_raw(buf.as_raw(), width, height, 3, 3).map(ImageData::U8),
        DynamicImage::ImageRgba8(buf) => planes_from_raw(buf.as_raw(), width, height, 4, 3).map(ImageData::U8),
        DynamicImage::ImageLuma16(buf) => planes_from_raw(buf.as_raw(), width, height, 1, 1).map(ImageData::U16),
        DynamicImage::ImageLumaA16(buf) => planes_from_raw(buf.as_raw(), width, height, 2, 1).map(ImageData::U16),
        DynamicImage::ImageRgb16(buf) => planes_from_raw(buf.as_raw(), width, height, 3, 3).map(ImageData::U16),
        DynamicImage::ImageRgba16(buf) => planes_from_raw(buf.as_raw(), width, height, 4, 3).map(ImageData::U16),
        DynamicImage::ImageRgb32F(buf) => planes_from_raw(buf.as_raw(), width, height, 3, 3).map(ImageData::F32),
        DynamicImage::ImageRgba32F(buf) => planes_from_raw(buf.as_raw(), width, height, 4, 3).map(ImageData::F32),
        other => Err(StitchError::UnsupportedPixelType(format!("{:?}", other.color())).into()),
    }
}

/// Splits interleaved samples into `[x, y]` planes, keeping the first `keep` channels.
fn planes_from_raw<T: Sample>(
    raw: &[T],
    width: usize,
    height: usize,
    stride: usize,
    keep: usize,
) -> crate::Result<ImageStack<T>> {
    let planes = (0..keep)
        .map(|c| ArrayD::from_shape_fn(IxDyn(&[width, height]), |idx| raw[(idx[1] * width + idx[0]) * stride + c]))
        .collect();
    ImageStack::from_planes(keep, 1, planes)
}

/// Writes one channel/timepoint of a 2D tile. Float data is rescaled to the
/// full 16-bit range.
pub fn save_image<P: AsRef<Path>>(data: &ImageData, channel: usize, timepoint: usize, path: P) -> crate::Result<()> {
    let dims = data.dimensions();
    if dims.len() != 2 {
        return Err(StitchError::Configuration(format!(
            "only 2D tiles can be written as images, got {} dimensions",
            dims.len()
        ))
        .into());
    }
    let (width, height) = (dims[0] as u32, dims[1] as u32);

    match data {
        ImageData::U8(stack) => {
            let plane = stack.plane(channel, timepoint)?;
            let buf = ImageBuffer::<Luma<u8>, _>::from_fn(width, height, |x, y| {
                Luma([plane[[x as usize, y as usize]]])
            });
            buf.save(path)?;
        }
        ImageData::U16(stack) => {
            let plane = stack.plane(channel, timepoint)?;
            let buf = ImageBuffer::<Luma<u16>, _>::from_fn(width, height, |x, y| {
                Luma([plane[[x as usize, y as usize]]])
            });
            buf.save(path)?;
        }
        ImageData::F32(stack) => {
            let plane = stack.plane(channel, timepoint)?;
            let (min, max) = plane
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let range = if max > min { max - min } else { 1.0 };
            let buf = ImageBuffer::<Luma<u16>, _>::from_fn(width, height, |x, y| {
                let v = plane[[x as usize, y as usize]];
                Luma([u16::from_f32((v - min) / range * u16::MAX as f32)])
            });
            buf.save(path)?;
        }
    }
    Ok(())
}
