//! T1/M0 relaxometry fitters: variable flip-angle (with optional B1
//! correction) and inversion recovery (with optional efficiency-term fit).
//!
//! Every variant implements [`T1Fitter`], the common contract §4.2
//! specifies: install per-voxel signals, then fit and get back T1, M0, EW
//! and a per-voxel [`ErrorCode`].

mod ir;
mod vfa;

pub use ir::Ir;
pub use vfa::Vfa;

use crate::error::Error;
use crate::error_tracker::ErrorCode;

/// Fitted T1/M0/efficiency-weighting triple plus the per-voxel status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct T1FitResult {
    pub t1_ms: f64,
    pub m0: f64,
    pub ew: f64,
    pub error: ErrorCode,
}

/// Common contract of every T1 estimator: install signals, then fit.
pub trait T1Fitter {
    /// Minimum number of input signals this variant accepts.
    fn min_inputs(&self) -> usize;
    /// Maximum number of input signals this variant accepts.
    fn max_inputs(&self) -> usize;

    /// Validates `signals.len()` against [`T1Fitter::min_inputs`] /
    /// [`T1Fitter::max_inputs`] and installs them.
    fn set_inputs(&mut self, signals: &[f64]) -> Result<(), Error>;

    /// Runs the fit, returning the recovered parameters and status.
    fn fit_t1(&mut self) -> T1FitResult;

    fn validate_input_count(&self, n: usize, context: &'static str) -> Result<(), Error> {
        if n < self.min_inputs() || n > self.max_inputs() {
            return Err(Error::InputCountOutOfRange {
                context,
                min: self.min_inputs(),
                max: self.max_inputs(),
                actual: n,
            });
        }
        Ok(())
    }
}

/// Forward model shared by both VFA variants:
/// S(α) = M0·sinα·(1−E)/(1−cosα·E), E = exp(−TR/T1).
pub fn vfa_signal(t1_ms: f64, m0: f64, flip_angle_rad: f64, tr_ms: f64) -> f64 {
    let e = if t1_ms > 0.0 {
        (-tr_ms / t1_ms).exp()
    } else {
        0.0
    };
    m0 * flip_angle_rad.sin() * (1.0 - e) / (1.0 - flip_angle_rad.cos() * e)
}

/// Forward model shared by the IR variants:
/// S(TI) = |M0·(1 − 2·EW·exp(−TI/T1) + exp(−TR/T1))|.
pub fn ir_signal(t1_ms: f64, m0: f64, ew: f64, ti_ms: f64, tr_ms: f64) -> f64 {
    let e_ti = if t1_ms > 0.0 { (-ti_ms / t1_ms).exp() } else { 0.0 };
    let e_tr = if t1_ms > 0.0 { (-tr_ms / t1_ms).exp() } else { 0.0 };
    (m0 * (1.0 - 2.0 * ew * e_ti + e_tr)).abs()
}

const T1_MAD_MIN: f64 = 0.0;
const T1_MAD_MAX: f64 = 10000.0;

fn t1_is_mad(t1_ms: f64) -> bool {
    !(t1_ms > T1_MAD_MIN && t1_ms <= T1_MAD_MAX)
}
