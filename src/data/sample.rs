use serde::{Deserialize, Serialize};

/// Storage width of the samples of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    fn rank(self) -> u8 {
        match self {
            PixelType::U8 => 0,
            PixelType::U16 => 1,
            PixelType::F32 => 2,
        }
    }

    /// The type able to hold every input without loss of range: float beats
    /// 16-bit beats 8-bit.
    pub fn widest<I: IntoIterator<Item = PixelType>>(types: I) -> Option<PixelType> {
        types.into_iter().max_by_key(|t| t.rank())
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelType::U8 => "8-bit",
            PixelType::U16 => "16-bit",
            PixelType::F32 => "32-bit float",
        }
    }
}

/// Scalar sample types a tile can be stored in.
///
/// Everything numeric in the crate works on `f32`; this trait is the single
/// conversion point, so type dispatch happens once per tile and never per pixel.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    fn to_f32(self) -> f32;

    /// Converts back, rounding and saturating for integer types.
    fn from_f32(value: f32) -> Self;
}

impl Sample for u8 {
    const PIXEL_TYPE: PixelType = PixelType::U8;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl Sample for u16 {
    const PIXEL_TYPE: PixelType = PixelType::U16;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Sample for f32 {
    const PIXEL_TYPE: PixelType = PixelType::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}
