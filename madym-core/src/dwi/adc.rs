//! Mono-exponential ADC fitter.

use nalgebra::DVector;

use madym_optim::{minimise, Bounds, CostFunction, OptimiserKind, StopReason};

use crate::error::Error;

use super::{adc_signal, DwiErrorCode, DwiFitResult, DwiFitter};

const MAX_ITERATIONS: usize = 500;

/// Mono-exponential ADC fitter: S(b) = S0·exp(-ADC·b).
pub struct Adc {
    linear_only: bool,
    bvals: Vec<f64>,
    signals: Vec<f64>,
    max_iterations: usize,
}

impl Adc {
    pub fn new(linear_only: bool) -> Self {
        Self {
            linear_only,
            bvals: Vec::new(),
            signals: Vec::new(),
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Linear fit of ln(S) against b: S0 = exp(intercept), ADC = -slope.
    pub(crate) fn linear_fit(bvals: &[f64], signals: &[f64]) -> (f64, f64) {
        let n = bvals.len() as f64;
        let y: Vec<f64> = signals.iter().map(|s| s.ln()).collect();
        let mean_x = bvals.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let cov: f64 = bvals.iter().zip(y.iter()).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
        let var: f64 = bvals.iter().map(|x| (x - mean_x).powi(2)).sum();
        let slope = cov / var;
        let intercept = mean_y - slope * mean_x;
        (intercept.exp(), -slope)
    }
}

struct AdcCost<'a> {
    bvals: &'a [f64],
    signals: &'a [f64],
}

impl CostFunction for AdcCost<'_> {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        let (s0, adc) = (x[0], x[1]);
        self.bvals
            .iter()
            .zip(self.signals.iter())
            .map(|(&b, &s)| (adc_signal(s0, adc, b) - s).powi(2))
            .sum()
    }
}

impl DwiFitter for Adc {
    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        50
    }

    fn set_inputs(&mut self, bvals: &[f64], signals: &[f64]) -> Result<(), Error> {
        if signals.len() < self.min_inputs() || signals.len() > self.max_inputs() {
            return Err(Error::InputCountOutOfRange {
                context: "Adc::set_inputs",
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
        if self.signals.iter().any(|&s| s <= 0.0) {
            return DwiFitResult {
                params: vec![f64::NAN, f64::NAN],
                ssr: f64::NAN,
                error: DwiErrorCode::InputZero,
            };
        }

        let (s0_seed, adc_seed) = Self::linear_fit(&self.bvals, &self.signals);

        if self.linear_only {
            let cost = AdcCost { bvals: &self.bvals, signals: &self.signals };
            let x0 = DVector::from_vec(vec![s0_seed, adc_seed]);
            let ssr = cost.cost(&x0);
            return DwiFitResult {
                params: vec![s0_seed, adc_seed],
                ssr,
                error: DwiErrorCode::Ok,
            };
        }

        let cost = AdcCost { bvals: &self.bvals, signals: &self.signals };
        let bounds = Bounds::new(vec![0.0, 1e-4], vec![1e6, 1e6]).unwrap();
        let x0 = bounds.clamp(&DVector::from_vec(vec![s0_seed, adc_seed]));
        let result = minimise(&cost, &bounds, &x0, self.max_iterations, OptimiserKind::Bleic);

        if result.stop_reason == StopReason::MaxIterations {
            return DwiFitResult {
                params: vec![result.params[0], result.params[1]],
                ssr: result.cost,
                error: DwiErrorCode::MaxIter,
            };
        }

        DwiFitResult {
            params: vec![result.params[0], result.params[1]],
            ssr: result.cost,
            error: DwiErrorCode::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_known_adc() {
        let bvals = vec![0.0, 50.0, 100.0, 400.0, 800.0];
        let s0_true = 1000.0;
        let adc_true = 0.0012;
        let signals: Vec<f64> = bvals.iter().map(|&b| adc_signal(s0_true, adc_true, b)).collect();

        let mut fitter = Adc::new(false);
        fitter.set_inputs(&bvals, &signals).unwrap();
        let result = fitter.fit();
        assert_eq!(result.error, DwiErrorCode::Ok);
        assert!((result.params[0] - s0_true).abs() / s0_true < 0.01);
        assert!((result.params[1] - adc_true).abs() / adc_true < 0.01);
    }

    #[test]
    fn rejects_nonpositive_signal() {
        let bvals = vec![0.0, 50.0, 100.0];
        let signals = vec![100.0, 0.0, 50.0];
        let mut fitter = Adc::new(false);
        fitter.set_inputs(&bvals, &signals).unwrap();
        let result = fitter.fit();
        assert_eq!(result.error, DwiErrorCode::InputZero);
    }
}
