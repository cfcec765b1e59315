use thiserror::Error;

/// Failure classes of a stitching run.
///
/// Errors travel inside `anyhow::Error`; use `downcast_ref::<StitchError>()` to
/// recover the variant. Missing overlaps and exhausted outlier rejection are not
/// errors, they are reported by [`crate::optimization::OptimizationStatus`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StitchError {
    #[error("invalid stitching configuration: {0}")]
    Configuration(String),

    #[error("unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    #[error("dimensionality mismatch: first block has {first} dimensions, second has {second}")]
    DimensionalityMismatch { first: usize, second: usize },

    #[error("no block for channel {channel}, timepoint {timepoint}: {reason}")]
    BlockUnavailable {
        channel: usize,
        timepoint: usize,
        reason: String,
    },

    #[error("model cannot be inverted: {0}")]
    NoninvertibleModel(String),

    #[error("numerical failure: {0}")]
    Numerical(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid inputs; fails only the call that received them.
    Configuration,
    /// Handled locally by skipping an element or invalidating a pair.
    Numerical,
}

impl StitchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StitchError::Configuration(_)
            | StitchError::UnsupportedPixelType(_)
            | StitchError::DimensionalityMismatch { .. }
            | StitchError::BlockUnavailable { .. } => ErrorKind::Configuration,
            StitchError::NoninvertibleModel(_) | StitchError::Numerical(_) => ErrorKind::Numerical,
        }
    }
}
