//! Voxel-wise pharmacokinetic and relaxometry model fitting.
//!
//! This crate is the numerical core (§1-§5 of the design): dense 3D image
//! volumes with acquisition metadata, arterial/portal input functions, T1
//! and DWI relaxometry fitters, the tracer-kinetic model family, per-voxel
//! signal-to-concentration conversion, and the bounded nonlinear
//! least-squares driver that ties them together over a full ROI. File I/O,
//! CLI glue and logger/audit setup live in `madym-io` and `madym-cli`.

pub mod aif;
pub mod dce;
pub mod dce_fitter;
pub mod dce_voxel;
pub mod dwi;
pub mod error;
pub mod error_tracker;
pub mod image3d;
pub mod stats;
pub mod t1;
pub mod volume_analysis;
