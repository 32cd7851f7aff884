//! Variable flip-angle T1/M0 fitter, with an optional per-voxel B1
//! correction (`usingB1`).

use nalgebra::DVector;

use madym_optim::{minimise, Bounds, CostFunction, OptimiserKind, StopReason};

use crate::error::Error;
use crate::error_tracker::ErrorCode;

use super::{t1_is_mad, vfa_signal, T1FitResult, T1Fitter};

const MAX_ITERATIONS: usize = 500;
const LARGE_T1: f64 = 1e7;
const LARGE_M0: f64 = 1e7;

/// Variable flip-angle T1 fitter. When `using_b1` is set, the last input
/// passed to [`T1Fitter::set_inputs`] is the per-voxel B1 scalar rather
/// than a signal.
pub struct Vfa {
    flip_angles_rad: Vec<f64>,
    tr_ms: f64,
    using_b1: bool,
    b1: f64,
    signals: Vec<f64>,
    max_iterations: usize,
}

impl Vfa {
    pub fn new(flip_angles_rad: Vec<f64>, tr_ms: f64) -> Self {
        Self {
            flip_angles_rad,
            tr_ms,
            using_b1: false,
            b1: 1.0,
            signals: Vec::new(),
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_b1_correction(flip_angles_rad: Vec<f64>, tr_ms: f64) -> Self {
        Self {
            using_b1: true,
            ..Self::new(flip_angles_rad, tr_ms)
        }
    }

    fn effective_angles(&self) -> Vec<f64> {
        self.flip_angles_rad.iter().map(|&a| a * self.b1).collect()
    }

    /// Deichmann linearisation: fit y = S/sinα against x = cosα·S/sinα by a
    /// degree-1 polynomial; slope is E1 = exp(-TR/T1), intercept is M0(1-E1).
    fn linear_fit(&self) -> (f64, f64) {
        let angles = self.effective_angles();
        let n = angles.len() as f64;
        let xy: Vec<(f64, f64)> = angles
            .iter()
            .zip(self.signals.iter())
            .map(|(&a, &s)| {
                let y = s / a.sin();
                let x = a.cos() * y;
                (x, y)
            })
            .collect();
        let mean_x = xy.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = xy.iter().map(|(_, y)| y).sum::<f64>() / n;
        let cov: f64 = xy.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
        let var: f64 = xy.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        let slope = cov / var;
        let intercept = mean_y - slope * mean_x;
        let t1 = -self.tr_ms / slope.ln();
        let m0 = intercept / (1.0 - slope);
        (t1, m0)
    }
}

struct VfaCost<'a> {
    angles: &'a [f64],
    signals: &'a [f64],
    tr_ms: f64,
}

impl CostFunction for VfaCost<'_> {
    fn cost(&self, x: &DVector<f64>) -> f64 {
        let (t1, m0) = (x[0], x[1]);
        self.angles
            .iter()
            .zip(self.signals.iter())
            .map(|(&a, &s)| (vfa_signal(t1, m0, a, self.tr_ms) - s).powi(2))
            .sum()
    }
}

impl T1Fitter for Vfa {
    fn min_inputs(&self) -> usize {
        3
    }

    fn max_inputs(&self) -> usize {
        50
    }

    fn set_inputs(&mut self, inputs: &[f64]) -> Result<(), Error> {
        self.validate_input_count(inputs.len(), "Vfa::set_inputs")?;
        if self.using_b1 {
            let (signals, b1) = inputs.split_at(inputs.len() - 1);
            self.signals = signals.to_vec();
            self.b1 = b1[0];
        } else {
            self.signals = inputs.to_vec();
        }
        Ok(())
    }

    fn fit_t1(&mut self) -> T1FitResult {
        if self.using_b1 && self.b1 <= 0.0 {
            return T1FitResult {
                t1_ms: 0.0,
                m0: 0.0,
                ew: 1.0,
                error: ErrorCode::B1Invalid,
            };
        }

        let (t1_seed, m0_seed) = self.linear_fit();
        if !t1_seed.is_finite() || !m0_seed.is_finite() {
            return T1FitResult {
                t1_ms: 0.0,
                m0: 0.0,
                ew: 1.0,
                error: ErrorCode::T1InitFail,
            };
        }

        let angles = self.effective_angles();
        let cost = VfaCost {
            angles: &angles,
            signals: &self.signals,
            tr_ms: self.tr_ms,
        };
        let bounds = Bounds::new(vec![0.0, 0.0], vec![LARGE_T1, LARGE_M0]).unwrap();
        let x0 = DVector::from_vec(vec![t1_seed.max(0.0), m0_seed.max(0.0)]);
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
            ew: 1.0,
            error: ErrorCode::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg_to_rad(d: f64) -> f64 {
        d * std::f64::consts::PI / 180.0
    }

    #[test]
    fn recovers_known_t1_m0() {
        let angles = vec![deg_to_rad(2.0), deg_to_rad(10.0), deg_to_rad(18.0)];
        let tr = 3.5;
        let t1_true = 1000.0;
        let m0_true = 2000.0;
        let signals: Vec<f64> = angles
            .iter()
            .map(|&a| vfa_signal(t1_true, m0_true, a, tr))
            .collect();

        let mut fitter = Vfa::new(angles, tr);
        fitter.set_inputs(&signals).unwrap();
        let result = fitter.fit_t1();
        assert_eq!(result.error, ErrorCode::Ok);
        assert!((result.t1_ms - t1_true).abs() / t1_true < 0.01);
        assert!((result.m0 - m0_true).abs() / m0_true < 0.01);
    }

    #[test]
    fn rejects_invalid_b1() {
        let angles = vec![deg_to_rad(2.0), deg_to_rad(10.0), deg_to_rad(18.0)];
        let mut fitter = Vfa::with_b1_correction(angles, 3.5);
        let mut inputs = vec![100.0, 200.0, 300.0];
        inputs.push(0.0); // invalid B1
        fitter.set_inputs(&inputs).unwrap();
        let result = fitter.fit_t1();
        assert_eq!(result.error, ErrorCode::B1Invalid);
    }

    #[test]
    fn rejects_too_few_inputs() {
        let angles = vec![deg_to_rad(2.0), deg_to_rad(10.0), deg_to_rad(18.0)];
        let mut fitter = Vfa::new(angles, 3.5);
        assert!(fitter.set_inputs(&[1.0, 2.0]).is_err());
    }
}
