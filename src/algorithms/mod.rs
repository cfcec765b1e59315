pub mod cross_correlation;
pub mod fft;
pub mod pairwise;
pub mod phase_correlation;
pub mod subpixel;

pub use cross_correlation::*;
pub use fft::*;
pub use pairwise::*;
pub use phase_correlation::*;
pub use subpixel::*;
