//! Biexponential intravoxel incoherent motion (IVIM) fitter.

use nalgebra::DVector;

use madym_optim::{minimise, Bounds, CostFunction, OptimiserKind, StopReason};

use crate::error::Error;

use super::adc::Adc;
use super::{ivim_signal, DwiErrorCode, DwiFitResult, DwiFitter};

const MAX_ITERATIONS: usize = 500;

/// Biexponential IVIM fitter: S(b) = S0·((1−f)·exp(−D·b) + f·exp(−D*·b))
/// (`full`), or its 3-parameter degenerate form (`!full`).
///
/// For each candidate threshold in `b_thresholds`, seeds a joint fit from
/// two linear ADC fits (one on b ≥ threshold, one on b < threshold when
/// `full`), then keeps the threshold with lowest SSR. Every threshold's SSR
/// is retained in [`Ivim::threshold_diagnostics`] even when it did not win.
pub struct Ivim {
    full: bool,
    b_thresholds: Vec<f64>,
    bvals: Vec<f64>,
    signals: Vec<f64>,
    max_iterations: usize,
    threshold_diagnostics: Vec<(f64, f64)>,
}

impl Ivim {
    pub fn new(full: bool, b_thresholds: Vec<f64>) -> Self {
        Self {
            full,
            b_thresholds,
            bvals: Vec::new(),
            signals: Vec::new(),
            max_iterations: MAX_ITERATIONS,
            threshold_diagnostics: Vec::new(),
        }
    }

    /// (threshold, SSR) pairs for every candidate threshold tried in the
    /// last [`DwiFitter::fit`] call, not just the winner.
    pub fn threshold_diagnostics(&self) -> &[(f64, f64)] {
        &self.threshold_diagnostics
    }
}

struct IvimCost<'a> {
    bvals: &'a [f64],
    signals: &'a [f64],
    full: bool,
}

impl CostFunction for IvimCost<'_> {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        let s0 = x[0];
        let d = x[1];
        let f = x[2];
        let dstar = if self.full { x[3] } else { 0.0 };
        self.bvals
            .iter()
            .zip(self.signals.iter())
            .map(|(&b, &s)| (ivim_signal(s0, d, dstar, f, b, self.full) - s).powi(2))
            .sum()
    }
}

impl DwiFitter for Ivim {
    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        10
    }

    fn set_inputs(&mut self, bvals: &[f64], signals: &[f64]) -> Result<(), Error> {
        if signals.len() < self.min_inputs() || signals.len() > self.max_inputs() {
            return Err(Error::InputCountOutOfRange {
                context: "Ivim::set_inputs",
                min: self.min_inputs(),
                max: self.max_inputs(),
                actual: signals.len(),
            });
        }
        self.bvals = bvals.to_vec();
        self.signals = signals.to_vec();
        Ok(())
    }

    fn fit(&mut self) -> DwiFitResult {
        self.threshold_diagnostics.clear();

        if self.signals.iter().any(|&s| s <= 0.0) {
            let n_params = if self.full { 4 } else { 3 };
            return DwiFitResult {
                params: vec![f64::NAN; n_params],
                ssr: f64::NAN,
                error: DwiErrorCode::InputZero,
            };
        }

        let s0_meas = self
            .bvals
            .iter()
            .zip(self.signals.iter())
            .find(|(&b, _)| b == 0.0)
            .map(|(_, &s)| s)
            .unwrap_or(self.signals[0]);

        let mut best: Option<DwiFitResult> = None;

        for &bthresh in &self.b_thresholds {
            let mut bvals_hi = Vec::new();
            let mut signals_hi = Vec::new();
            let mut bvals_lo = Vec::new();
            let mut signals_lo = Vec::new();
            for (&b, &s) in self.bvals.iter().zip(self.signals.iter()) {
                if b >= bthresh {
                    bvals_hi.push(b);
                    signals_hi.push(s);
                } else {
                    bvals_lo.push(b);
                    signals_lo.push(s);
                }
            }
            if bvals_hi.len() < 2 || (self.full && bvals_lo.len() < 2) {
                continue;
            }

            let (s0_hi, d_hi) = Adc::linear_fit(&bvals_hi, &signals_hi);

            let (signals_to_fit, bvals_to_fit, starting_vals): (Vec<f64>, Vec<f64>, Vec<f64>) =
                if self.full {
                    let (s0_lo, dstar_lo) = Adc::linear_fit(&bvals_lo, &signals_lo);
                    let f_strt = if s0_lo > s0_hi { 1.0 - s0_hi / s0_lo } else { 0.0 };
                    (
                        self.signals.clone(),
                        self.bvals.clone(),
                        vec![s0_lo, d_hi, f_strt, dstar_lo],
                    )
                } else {
                    let f_strt = 1.0 - s0_hi / s0_meas;
                    (signals_hi.clone(), bvals_hi.clone(), vec![s0_meas, d_hi, f_strt])
                };

            let cost = IvimCost {
                bvals: &bvals_to_fit,
                signals: &signals_to_fit,
                full: self.full,
            };
            let (lo, hi) = if self.full {
                (vec![0.0, 1e-4, 0.0, 0.0], vec![1e6, 1e6, 1.0, 1e6])
            } else {
                (vec![0.0, 1e-4, 0.0], vec![1e6, 1e6, 1.0])
            };
            let bounds = Bounds::new(lo, hi).unwrap();
            let x0 = bounds.clamp(&DVector::from_vec(starting_vals));
            let result = minimise(&cost, &bounds, &x0, self.max_iterations, OptimiserKind::Bleic);

            self.threshold_diagnostics.push((bthresh, result.cost));

            let params: Vec<f64> = result.params.iter().copied().collect();
            let error = if result.stop_reason == StopReason::MaxIterations {
                DwiErrorCode::MaxIter
            } else {
                DwiErrorCode::Ok
            };
            let candidate = DwiFitResult { params, ssr: result.cost, error };

            if best.as_ref().map(|b| candidate.ssr < b.ssr).unwrap_or(true) {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| {
            let n_params = if self.full { 4 } else { 3 };
            DwiFitResult {
                params: vec![f64::NAN; n_params],
                ssr: f64::NAN,
                error: DwiErrorCode::FitFail,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_parameters_on_synthetic_ivim_curve() {
        let bvals = vec![0.0, 10.0, 20.0, 50.0, 100.0, 200.0, 400.0, 800.0];
        let s0_true = 1000.0;
        let d_true = 0.001;
        let dstar_true = 0.02;
        let f_true = 0.1;
        let signals: Vec<f64> = bvals
            .iter()
            .map(|&b| ivim_signal(s0_true, d_true, dstar_true, f_true, b, true))
            .collect();

        let mut fitter = Ivim::new(true, vec![100.0, 150.0, 200.0]);
        fitter.set_inputs(&bvals, &signals).unwrap();
        let result = fitter.fit();
        assert_eq!(result.error, DwiErrorCode::Ok);
        assert!((result.params[0] - s0_true).abs() / s0_true < 0.05);
        assert!((result.params[1] - d_true).abs() / d_true < 0.2);
        assert!(!fitter.threshold_diagnostics().is_empty());
    }

    #[test]
    fn rejects_nonpositive_signal() {
        let bvals = vec![0.0, 10.0, 20.0];
        let signals = vec![100.0, -1.0, 50.0];
        let mut fitter = Ivim::new(false, vec![10.0]);
        fitter.set_inputs(&bvals, &signals).unwrap();
        let result = fitter.fit();
        assert_eq!(result.error, DwiErrorCode::InputZero);
    }
}
