//! CLI-level fatal errors: everything that should abort a run before any
//! per-voxel fitting starts (bad config, unresolvable model/input-function
//! selection, no dynamic images supplied). Per-voxel faults never reach
//! here — they stay in the `ErrorTracker` bitmask the underlying analysis
//! writes out alongside the parameter maps.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no dynamic images given (pass at least one with --dyn)")]
    NoDynamicImages,

    #[error("'{model}' requires an AIF; pass --aif-file, --auto-aif, or select a population model")]
    MissingAif { model: String },

    #[error("--fixed-params and --fixed-values must have the same length ({n_params} vs {n_values})")]
    FixedParamsLengthMismatch { n_params: usize, n_values: usize },

    #[error("--relative-limit-params and --relative-limit-values must have the same length ({n_params} vs {n_values})")]
    RelativeBoundsLengthMismatch { n_params: usize, n_values: usize },

    #[error("--init-params has {actual} values, model '{model}' has {expected} parameters")]
    InitParamsLengthMismatch { model: String, expected: usize, actual: usize },

    #[error("config file '{path}': {detail}")]
    ConfigBad { path: String, detail: String },

    #[error("unrecognised --opt-type '{0}' (expected 'BLEIC' or 'NS')")]
    UnknownOptType(String),

    #[error("unrecognised --T1-method '{0}' (expected 'VFA', 'VFA_B1', 'IR' or 'IR_EFF')")]
    UnknownT1Method(String),

    #[error("unrecognised DWI model '{0}' (expected 'ADC', 'IVIM' or 'IVIM_FULL')")]
    UnknownDwiModel(String),

    #[error(transparent)]
    Core(#[from] madym_core::error::Error),

    #[error(transparent)]
    Io(#[from] madym_io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
