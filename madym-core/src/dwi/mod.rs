//! Diffusion-weighted fitters: ADC (mono-exponential) and IVIM
//! (biexponential, intravoxel incoherent motion).
//!
//! These carry their own small status enum rather than ErrorTracker bits —
//! the stable ErrorTracker bit table (§3) has no DWI-specific members, so a
//! DWI failure is reported the same way DCEVoxel reports its own status
//! (see [`crate::dce_voxel::VoxelStatus`]): a dedicated enum local to the
//! family.

mod adc;
mod ivim;

pub use adc::Adc;
pub use ivim::Ivim;

use crate::error::Error;

/// Per-voxel DWI fit status. Distinct from [`crate::error_tracker::ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwiErrorCode {
    Ok,
    /// An input signal was ≤ 0; the model cannot be log-linearised.
    InputZero,
    FitFail,
    MaxIter,
}

/// Outcome of a DWI fit: the free parameters (model-specific length), the
/// sum of squared residuals, and the status.
#[derive(Debug, Clone)]
pub struct DwiFitResult {
    pub params: Vec<f64>,
    pub ssr: f64,
    pub error: DwiErrorCode,
}

pub trait DwiFitter {
    fn min_inputs(&self) -> usize;
    fn max_inputs(&self) -> usize;
    fn set_inputs(&mut self, bvals: &[f64], signals: &[f64]) -> Result<(), Error>;
    fn fit(&mut self) -> DwiFitResult;
}

/// S(b) = S0 * exp(-ADC*b).
pub fn adc_signal(s0: f64, adc: f64, b: f64) -> f64 {
    s0 * (-adc * b).exp()
}

/// S(b) = S0 * ((1-f)*exp(-D*b) + f*exp(-D**b)); when `full` is false the
/// D* term is dropped entirely (matching the original's degenerate form).
pub fn ivim_signal(s0: f64, d: f64, dstar: f64, f: f64, b: f64, full: bool) -> f64 {
    let e_d = (-d * b).exp();
    let e_dstar = if full { (-dstar * b).exp() } else { 0.0 };
    s0 * ((1.0 - f) * e_d + f * e_dstar)
}
