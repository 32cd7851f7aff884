//! Inversion-recovery T1/M0 fitter, with an optional efficiency-term
//! (`EW`) fit via a two-pass seeding scheme.

use nalgebra::DVector;

use madym_optim::{minimise, Bounds, CostFunction, OptimiserKind, StopReason};

use crate::error::Error;
use crate::error_tracker::ErrorCode;

use super::{ir_signal, t1_is_mad, T1FitResult, T1Fitter};

const MAX_ITERATIONS: usize = 500;

/// Inversion-recovery T1 fitter. `fit_efficiency` selects whether `EW` is a
/// free parameter (two-pass seeding) or held fixed at 1.
pub struct Ir {
    tis_ms: Vec<f64>,
    tr_ms: f64,
    fit_efficiency: bool,
    signals: Vec<f64>,
    max_iterations: usize,
}

impl Ir {
    pub fn new(tis_ms: Vec<f64>, tr_ms: f64, fit_efficiency: bool) -> Self {
        Self {
            tis_ms,
            tr_ms,
            fit_efficiency,
            signals: Vec::new(),
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Runs the EW=1 fit used either as the final answer (`fit_efficiency ==
    /// false`) or as the seed for the two-pass EW fit.
    fn fit_ew_fixed(&self) -> (f64, f64, Option<ErrorCode>) {
        let t1_seed = 1000.0;
        let m0_seed = *self.signals.last().unwrap();

        let cost = IrCost {
            tis_ms: &self.tis_ms,
            signals: &self.signals,
            tr_ms: self.tr_ms,
            ew: 1.0,
        };
        let bounds = Bounds::new(vec![0.0, 0.0], vec![1e5, 1e6]).unwrap();
        let x0 = DVector::from_vec(vec![t1_seed, m0_seed.max(0.0)]);
        let result = minimise(&cost, &bounds, &x0, self.max_iterations, OptimiserKind::Bleic);

        if result.stop_reason == StopReason::MaxIterations {
            return (0.0, 0.0, Some(ErrorCode::T1MaxIter));
        }
        (result.params[0], result.params[1], None)
    }
}

struct IrCost<'a> {
    tis_ms: &'a [f64],
    signals: &'a [f64],
    tr_ms: f64,
    ew: f64,
}

impl CostFunction for IrCost<'_> {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        let (t1, m0) = (x[0], x[1]);
        self.tis_ms
            .iter()
            .zip(self.signals.iter())
            .map(|(&ti, &s)| (ir_signal(t1, m0, self.ew, ti, self.tr_ms) - s).powi(2))
            .sum()
    }
}

struct IrCostFull<'a> {
    tis_ms: &'a [f64],
    signals: &'a [f64],
    tr_ms: f64,
}

impl CostFunction for IrCostFull<'_> {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        let (t1, m0, ew) = (x[0], x[1], x[2]);
        self.tis_ms
            .iter()
            .zip(self.signals.iter())
            .map(|(&ti, &s)| (ir_signal(t1, m0, ew, ti, self.tr_ms) - s).powi(2))
            .sum()
    }
}

impl T1Fitter for Ir {
    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        50
    }

    fn set_inputs(&mut self, inputs: &[f64]) -> Result<(), Error> {
        self.validate_input_count(inputs.len(), "Ir::set_inputs")?;
        self.signals = inputs.to_vec();
        Ok(())
    }

    fn fit_t1(&mut self) -> T1FitResult {
        if !self.fit_efficiency {
            let (t1, m0, err) = self.fit_ew_fixed();
            if let Some(error) = err {
                return T1FitResult { t1_ms: 0.0, m0: 0.0, ew: 1.0, error };
            }
            if t1_is_mad(t1) {
                return T1FitResult {
                    t1_ms: 0.0,
                    m0: 0.0,
                    ew: 1.0,
                    error: ErrorCode::T1MadValue,
                };
            }
            return T1FitResult { t1_ms: t1, m0, ew: 1.0, error: ErrorCode::Ok };
        }

        // Two-pass scheme: seed T1, M0 from an EW=1 fit, then free EW.
        let (t1_seed, m0_seed, err) = self.fit_ew_fixed();
        if let Some(error) = err {
            return T1FitResult { t1_ms: 0.0, m0: 0.0, ew: 1.0, error };
        }

        let cost = IrCostFull {
            tis_ms: &self.tis_ms,
            signals: &self.signals,
            tr_ms: self.tr_ms,
        };
        let bounds = Bounds::new(vec![0.0, 0.0, 0.0], vec![1e5, 1e6, 1.0]).unwrap();
        let x0 = DVector::from_vec(vec![t1_seed, m0_seed.max(0.0), 1.0]);
        let result = minimise(&cost, &bounds, &x0, self.max_iterations, OptimiserKind::Bleic);

        if result.stop_reason == StopReason::MaxIterations {
            return T1FitResult {
                t1_ms: 0.0,
                m0: 0.0,
                ew: 1.0,
                error: ErrorCode::T1MaxIter,
            };
        }

        let t1 = result.params[0];
        if t1_is_mad(t1) {
            return T1FitResult {
                t1_ms: 0.0,
                m0: 0.0,
                ew: 1.0,
                error: ErrorCode::T1MadValue,
            };
        }

        T1FitResult {
            t1_ms: t1,
            m0: result.params[1],
            ew: result.params[2],
            error: ErrorCode::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_known_t1_m0_fixed_ew() {
        let tis = vec![100.0, 500.0, 1000.0, 2000.0];
        let tr = 5000.0;
        let t1_true = 900.0;
        let m0_true = 1500.0;
        let signals: Vec<f64> = tis.iter().map(|&ti| ir_signal(t1_true, m0_true, 1.0, ti, tr)).collect();

        let mut fitter = Ir::new(tis, tr, false);
        fitter.set_inputs(&signals).unwrap();
        let result = fitter.fit_t1();
        assert_eq!(result.error, ErrorCode::Ok);
        assert!((result.t1_ms - t1_true).abs() / t1_true < 0.02);
        assert_eq!(result.ew, 1.0);
    }

    #[test]
    fn recovers_efficiency_when_fitted() {
        let tis = vec![100.0, 500.0, 1000.0, 2000.0, 3000.0];
        let tr = 5000.0;
        let t1_true = 900.0;
        let m0_true = 1500.0;
        let ew_true = 0.95;
        let signals: Vec<f64> = tis
            .iter()
            .map(|&ti| ir_signal(t1_true, m0_true, ew_true, ti, tr))
            .collect();

        let mut fitter = Ir::new(tis, tr, true);
        fitter.set_inputs(&signals).unwrap();
        let result = fitter.fit_t1();
        assert_eq!(result.error, ErrorCode::Ok);
        assert!((result.t1_ms - t1_true).abs() / t1_true < 0.05);
        assert!((result.ew - ew_true).abs() < 0.05);
    }
}
