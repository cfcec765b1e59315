//! Deterministic test scenes with known tile positions.

pub mod noise;
pub mod scene;

pub use noise::*;
pub use scene::*;
