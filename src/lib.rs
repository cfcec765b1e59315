pub mod algorithms;
pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod fusion;
pub mod logging;
pub mod optimization;
pub mod pipeline;
pub mod synthetic;
pub mod utils;
pub mod visualization;

pub use algorithms::*;
pub use config::*;
pub use data::*;
pub use error::{ErrorKind, StitchError};
pub use fusion::*;
pub use optimization::*;
pub use pipeline::*;

pub type Result<T> = anyhow::Result<T>;
