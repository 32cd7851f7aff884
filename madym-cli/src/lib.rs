//! Shared glue behind `madym_DCE_lite`, `madym_T1_lite` and `madym_DWI_lite`:
//! config-file loading, CLI option merging and the orchestration each
//! binary's `main` drives. Kept as a library so the merge/orchestration
//! logic can be exercised without going through a subprocess.

pub mod config;
pub mod error;
pub mod pipeline;

pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Installs the `tracing` subscriber every binary in this crate starts
/// with: human-readable output to stderr, level from `-v`/`-vv`, overridable
/// by `RUST_LOG`.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_target(true)
        .with_env_filter(filter)
        .init();
}
