//! Tracer-kinetic forward models (§4.4): Patlak, ETM, DIETM, 2CXM, DIBEM,
//! AUEM, DISCM. Every model consumes a (resampled, delayed) arterial and,
//! for the dual-input forms, portal-venous input and produces a modelled
//! concentration series Cm(t).

mod auem;
mod dibem;
mod discm;
mod dietm;
mod etm;
mod patlak;
mod two_cxm;

pub use auem::Auem;
pub use dibem::Dibem;
pub use discm::Discm;
pub use dietm::Dietm;
pub use etm::Etm;
pub use patlak::Patlak;
pub use two_cxm::TwoCxm;

use crate::aif::Aif;
use crate::error::Error;
use crate::error_tracker::ErrorCode;

/// Rates at or above this are treated as "infinitely fast": the compartment
/// contributes nothing rather than overflowing the exponential.
const RATE_CUTOFF: f64 = 1e6;

/// Trapezoid-rule convolution of `cp` against the exponential response
/// e^{-K(t-s)}, using the semigroup identity to update the running integral
/// in a single pass: A_i = Δᵢ·½·(Cₚ(tᵢ) + Cₚ(tᵢ₋₁)·e^{-KΔᵢ}), Fᵢ =
/// Fᵢ₋₁·e^{-KΔᵢ} + Aᵢ. Shared by every compartmental model in this family.
/// `F[0] == 0.0`; callers needing a nonzero t=0 contribution (e.g. a vₚ·Cₐ
/// term) add it separately.
pub fn convolve(cp: &[f64], t: &[f64], k: f64) -> Vec<f64> {
    let n = cp.len();
    let mut f = vec![0.0; n];
    if n == 0 || k >= RATE_CUTOFF {
        return f;
    }
    for i in 1..n {
        let delta = t[i] - t[i - 1];
        let e_delta = (-k * delta).exp();
        let a_i = delta * 0.5 * (cp[i] + cp[i - 1] * e_delta);
        f[i] = f[i - 1] * e_delta + a_i;
    }
    f
}

/// Combines the (resampled, delayed) arterial and portal-venous inputs into
/// a single plasma input series: f_a·Ca(tau_a) + (1−f_a)·Cv(tau_v). Shared
/// by every dual-input model (DIETM, DIBEM, AUEM, DISCM).
pub fn mix_vifs(aif: &mut Aif, f_a: f64, tau_a: f64, tau_v: f64) -> Vec<f64> {
    aif.resample_aif(tau_a);
    aif.resample_pif(tau_v, false, true);
    let f_v = 1.0 - f_a;
    aif.aif().iter().zip(aif.pif().iter()).map(|(&ca, &cv)| f_a * ca + f_v * cv).collect()
}

/// Sums two independent exponential-response compartments fed from the same
/// plasma input: Cm = F⁺·(Cp ⊛ e^{-K⁺t}) + F⁻·(Cp ⊛ e^{-K⁻t}).
pub fn biexponential(f_pos: f64, f_neg: f64, k_pos: f64, k_neg: f64, cp: &[f64], t: &[f64]) -> Vec<f64> {
    let fp = convolve(cp, t, k_pos);
    let fn_ = convolve(cp, t, k_neg);
    fp.iter().zip(fn_.iter()).map(|(&a, &b)| f_pos * a + f_neg * b).collect()
}

/// Shared parameter bookkeeping every model in this family needs: names,
/// current/initial values, bounds, fixed-parameter masking and relative
/// bound tightening.
#[derive(Debug, Clone)]
pub struct ModelParams {
    names: Vec<&'static str>,
    values: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    optimised: Vec<bool>,
    relative: Vec<f64>,
}

impl ModelParams {
    pub fn new(names: Vec<&'static str>, init: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        let n = names.len();
        assert_eq!(init.len(), n);
        assert_eq!(lower.len(), n);
        assert_eq!(upper.len(), n);
        Self {
            names,
            values: init,
            lower,
            upper,
            optimised: vec![true; n],
            relative: vec![0.0; n],
        }
    }

    pub fn num_params(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|&n| n == name).map(|i| self.values[i])
    }

    /// Fixes the parameter at `index` out of the optimisation vector. When
    /// `value` is given it overwrites the current value (and the seed used
    /// on the next `reset`).
    pub fn fix(&mut self, index: usize, value: Option<f64>) {
        self.optimised[index] = false;
        if let Some(v) = value {
            self.values[index] = v;
        }
    }

    /// Tightens the optimisation bound for `index` to within ±`width` of its
    /// current value, clamped to the model's absolute bounds.
    pub fn set_relative_bound(&mut self, index: usize, width: f64) {
        self.relative[index] = width;
    }

    pub fn set_values(&mut self, values: &[f64]) {
        assert_eq!(values.len(), self.num_params());
        self.values = values.to_vec();
    }

    pub fn optimised_indices(&self) -> Vec<usize> {
        (0..self.num_params()).filter(|&i| self.optimised[i]).collect()
    }

    pub fn num_optimised(&self) -> usize {
        self.optimised_indices().len()
    }

    pub fn optimised_values(&self) -> Vec<f64> {
        self.optimised_indices().iter().map(|&i| self.values[i]).collect()
    }

    /// Writes the optimiser's free-parameter vector back into the full
    /// parameter vector, leaving fixed parameters untouched.
    pub fn set_optimised_values(&mut self, opt: &[f64]) {
        for (j, &i) in self.optimised_indices().iter().enumerate() {
            self.values[i] = opt[j];
        }
    }

    /// Lower/upper bounds for just the free parameters, with any relative
    /// bound applied and clamped to the absolute bound.
    pub fn optimised_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut lo = Vec::new();
        let mut hi = Vec::new();
        for i in self.optimised_indices() {
            if self.relative[i] > 0.0 {
                lo.push(self.lower[i].max(self.values[i] - self.relative[i]));
                hi.push(self.upper[i].min(self.values[i] + self.relative[i]));
            } else {
                lo.push(self.lower[i]);
                hi.push(self.upper[i]);
            }
        }
        (lo, hi)
    }
}

/// Common contract every tracer-kinetic model implements (§4.4).
pub trait DceModel {
    fn name(&self) -> &'static str;
    fn params(&self) -> &ModelParams;
    fn params_mut(&mut self) -> &mut ModelParams;

    /// Computes Cm(tᵢ) for i=0..n_times using the current parameter values.
    /// Writes zeros (and returns) if any parameter is NaN; writes zeros from
    /// the first non-finite intermediate onward if one appears mid-series.
    fn compute_ct(&self, aif: &Aif, n_times: usize) -> Vec<f64>;

    /// DCE_FIT_FAIL if any parameter is non-finite, DCE_INVALID_PARAM if a
    /// model-specific physiological invariant is violated, OK otherwise.
    /// The default only checks finiteness; models with an invariant (ETM)
    /// override this.
    fn check_params(&self) -> ErrorCode {
        if self.params().values().iter().any(|v| !v.is_finite()) {
            return ErrorCode::DceFitFail;
        }
        ErrorCode::Ok
    }
}

/// Builds a model instance by its CLI/config name (`model` option, §6).
pub fn model_by_name(name: &str) -> Result<Box<dyn DceModel>, Error> {
    match name {
        "Patlak" => Ok(Box::new(Patlak::new())),
        "ETM" => Ok(Box::new(Etm::new())),
        "DIETM" => Ok(Box::new(Dietm::new())),
        "2CXM" => Ok(Box::new(TwoCxm::new())),
        "DIBEM" => Ok(Box::new(Dibem::new())),
        "AUEM" => Ok(Box::new(Auem::new())),
        "DISCM" => Ok(Box::new(Discm::new())),
        other => Err(Error::ModelUnknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convolve_zero_rate_integrates_plainly() {
        let t = vec![0.0, 1.0, 2.0, 3.0];
        let cp = vec![1.0, 1.0, 1.0, 1.0];
        let f = convolve(&cp, &t, 0.0);
        assert_eq!(f[0], 0.0);
        assert!((f[1] - 1.0).abs() < 1e-12);
        assert!((f[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn convolve_high_rate_is_forced_to_zero() {
        let t = vec![0.0, 1.0, 2.0];
        let cp = vec![1.0, 1.0, 1.0];
        let f = convolve(&cp, &t, 1e7);
        assert!(f.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn model_params_fix_and_relative_bounds() {
        let mut p = ModelParams::new(vec!["a", "b"], vec![1.0, 2.0], vec![0.0, 0.0], vec![10.0, 10.0]);
        p.fix(0, Some(5.0));
        assert_eq!(p.num_optimised(), 1);
        assert_eq!(p.values()[0], 5.0);

        p.set_relative_bound(1, 0.5);
        let (lo, hi) = p.optimised_bounds();
        assert!((lo[0] - 1.5).abs() < 1e-12);
        assert!((hi[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn model_by_name_rejects_unknown() {
        assert!(model_by_name("NotAModel").is_err());
    }
}
