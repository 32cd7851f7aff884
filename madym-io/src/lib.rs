//! File-format and sidecar I/O for `madym-core`: XTR sidecars, AIF/PIF
//! ASCII files, Analyze 7.5 and NIFTI-1 image readers/writers, and the
//! parameter-map output directory layout (§6). None of `madym-core`'s
//! numerics depend on this crate; it only adapts external bytes to and
//! from `madym_core::image3d::Image3D` and `madym_core::aif::Aif`.

pub mod aif_file;
pub mod analyze;
pub mod datatype;
pub mod error;
mod header;
pub mod nifti;
pub mod param_maps;
mod voxels;
pub mod xtr;

pub use datatype::Datatype;
pub use error::{Error, Result};
