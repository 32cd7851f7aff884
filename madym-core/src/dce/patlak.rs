//! Patlak model: Cm = vp·Ca + Ktrans·∫₀ᵗ Ca.

use crate::aif::Aif;
use crate::error_tracker::ErrorCode;

use super::{DceModel, ModelParams};

pub struct Patlak {
    params: ModelParams,
}

impl Patlak {
    pub fn new() -> Self {
        Self {
            params: ModelParams::new(
                vec!["Ktrans", "v_p", "tau_a"],
                vec![0.2, 0.2, 0.0],
                vec![0.0, 0.0, 0.0],
                vec![10.0, 1.0, 0.5],
            ),
        }
    }
}

impl Default for Patlak {
    fn default() -> Self {
        Self::new()
    }
}

impl DceModel for Patlak {
    fn name(&self) -> &'static str {
        "Patlak"
    }

    fn params(&self) -> &ModelParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ModelParams {
        &mut self.params
    }

    fn compute_ct(&self, aif: &Aif, n_times: usize) -> Vec<f64> {
        let mut ct = vec![0.0; n_times];
        let v = self.params.values();
        let (ktrans, vp, tau_a) = (v[0], v[1], v[2]);
        if [ktrans, vp, tau_a].iter().any(|p| !p.is_finite()) {
            return ct;
        }

        let mut aif = aif.clone();
        aif.resample_aif(tau_a);
        let ca = aif.aif();
        let t = aif.times_min();

        if ktrans == 0.0 {
            for i in 0..n_times {
                ct[i] = vp * ca[i];
            }
            return ct;
        }

        ct[0] = vp * ca[0];
        let mut integral = 0.0;
        for i in 1..n_times {
            let delta = t[i] - t[i - 1];
            let ca_mid = (ca[i - 1] + ca[i]) / 2.0;
            integral += delta * ca_mid;
            ct[i] = vp * ca[i] + ktrans * integral;
        }
        ct
    }

    fn check_params(&self) -> ErrorCode {
        if self.params.values().iter().any(|v| !v.is_finite()) {
            return ErrorCode::DceFitFail;
        }
        ErrorCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ktrans_is_pure_blood_volume() {
        let aif = Aif::new(vec![0.0, 0.5, 1.0, 1.5]);
        let mut model = Patlak::new();
        model.params_mut().set_values(&[0.0, 0.3, 0.0]);
        let ct = model.compute_ct(&aif, 4);
        let mut aif2 = aif.clone();
        aif2.resample_aif(0.0);
        for (c, ca) in ct.iter().zip(aif2.aif().iter()) {
            assert!((c - 0.3 * ca).abs() < 1e-12);
        }
    }

    #[test]
    fn nan_param_yields_all_zero() {
        let aif = Aif::new(vec![0.0, 0.5, 1.0]);
        let mut model = Patlak::new();
        model.params_mut().set_values(&[f64::NAN, 0.2, 0.0]);
        let ct = model.compute_ct(&aif, 3);
        assert!(ct.iter().all(|&v| v == 0.0));
    }
}
