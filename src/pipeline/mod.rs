pub mod stitcher;
pub mod types;

pub use stitcher::*;
pub use types::*;
