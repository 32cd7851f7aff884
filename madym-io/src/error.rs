//! The I/O-layer error channel: sidecar/AIF parse failures and image
//! dimension/datatype mismatches on read. Distinct from
//! `madym_core::Error`, which never talks about files.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{path}: {detail}")]
    FileFormatBad { path: String, detail: String },

    #[error("{path}: unknown XTR key '{key}'")]
    UnknownXtrKey { path: String, key: String },

    #[error("{path}: expected {expected} (time, value) pairs, found {actual}")]
    WrongPairCount {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: unsupported or unrecognised datatype code {code}")]
    UnknownDatatype { path: String, code: i32 },

    #[error("{path}: image dimensions {dims:?} do not match the expected voxel count {n_voxels}")]
    DimensionDataMismatch {
        path: String,
        dims: [usize; 3],
        n_voxels: usize,
    },

    #[error("I/O error reading/writing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] madym_core::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
