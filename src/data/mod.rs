pub mod block;
pub mod loader;
pub mod roi;
pub mod sample;

pub use block::*;
pub use loader::*;
pub use roi::*;
pub use sample::*;
