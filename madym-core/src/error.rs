//! Global (fatal) error channel. See §7: these are raised as typed errors
//! carrying the function name and enough context to diagnose the failure;
//! callers at tool level convert them to non-zero exit codes. Per-voxel
//! faults never use this channel — see [`crate::error_tracker::ErrorCode`].

/// Fatal, non-per-voxel errors raised by `madym-core`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("{context}: image dimensions {lhs:?} do not match reference dimensions {rhs:?}")]
    DimensionMismatch {
        context: &'static str,
        lhs: [usize; 3],
        rhs: [usize; 3],
    },

    #[error("{context}: voxel size {lhs:?} mm does not match reference voxel size {rhs:?} mm")]
    VoxelSizeMismatch {
        context: &'static str,
        lhs: [f64; 3],
        rhs: [f64; 3],
    },

    #[error("{context}: file format invalid: {detail}")]
    FileFormatBad {
        context: &'static str,
        detail: String,
    },

    #[error("{context}: required metadata field '{field}' is not set")]
    MissingMetadata {
        context: &'static str,
        field: &'static str,
    },

    #[error("unrecognised model name '{0}'")]
    ModelUnknown(String),

    #[error("{context}: optimiser failed without a recoverable error code: {detail}")]
    OptimiserFailureNonrecoverable {
        context: &'static str,
        detail: String,
    },

    #[error("{context}: expected between {min} and {max} inputs, got {actual}")]
    InputCountOutOfRange {
        context: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("{0}")]
    Index(#[from] crate::image3d::IndexError),
}

pub type Result<T> = std::result::Result<T, Error>;
