//! Compositing registered tiles into one image.

pub mod bounds;
pub mod fuser;
pub mod interpolation;
pub mod pixel_fusion;

pub use bounds::*;
pub use fuser::*;
pub use interpolation::*;
pub use pixel_fusion::*;
