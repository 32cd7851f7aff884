//! Dual-input extended Tofts model: as ETM but with the plasma input formed
//! from a weighted arterial/portal-venous mixture, Cp = f_a·Ca(tau_a) +
//! (1−f_a)·Cv(tau_v).

use crate::aif::Aif;
use crate::error_tracker::ErrorCode;

use super::{convolve, DceModel, ModelParams};

pub struct Dietm {
    params: ModelParams,
}

impl Dietm {
    pub fn new() -> Self {
        Self {
            params: ModelParams::new(
                vec!["Ktrans", "v_e", "v_p", "f_a", "tau_a", "tau_v"],
                vec![0.2, 0.2, 0.2, 0.5, 0.0, 0.0],
                vec![1e-20, 1e-20, 0.0, 0.0, 0.0, -0.5],
                vec![10.0, 10.0, 10.0, 1.0, 0.5, 0.5],
            ),
        }
    }
}

impl Default for Dietm {
    fn default() -> Self {
        Self::new()
    }
}

impl DceModel for Dietm {
    fn name(&self) -> &'static str {
        "DIETM"
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
        let (ktrans, ve, vp, f_a, tau_a, tau_v) = (v[0], v[1], v[2], v[3], v[4], v[5]);
        if v.iter().any(|p| !p.is_finite()) {
            return ct;
        }

        let mut aif = aif.clone();
        aif.resample_aif(tau_a);
        aif.resample_pif(tau_v, false, true);
        let f_v = 1.0 - f_a;
        let cp: Vec<f64> = aif.aif().iter().zip(aif.pif().iter()).map(|(&ca, &cv)| f_a * ca + f_v * cv).collect();

        if ve == 0.0 || ktrans == 0.0 {
            for i in 0..n_times {
                ct[i] = vp * cp[i];
            }
            return ct;
        }

        let kep = ktrans / ve;
        let f = convolve(&cp, aif.times_min(), kep);

        ct[0] = vp * cp[0];
        for i in 1..n_times {
            let c_t = vp * cp[i] + ktrans * f[i];
            if !c_t.is_finite() {
                return ct;
            }
            ct[i] = c_t;
        }
        ct
    }

    fn check_params(&self) -> ErrorCode {
        let v = self.params.values();
        if v.iter().any(|p| !p.is_finite()) {
            return ErrorCode::DceFitFail;
        }
        if v[1] + v[2] > 1.0 {
            return ErrorCode::DceInvalidParam;
        }
        ErrorCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_arterial_input_matches_etm() {
        let times: Vec<f64> = (0..60).map(|i| i as f64 * 5.0 / 60.0).collect();
        let aif = Aif::new(times.clone());

        let mut dietm = Dietm::new();
        dietm.params_mut().set_values(&[0.25, 0.3, 0.05, 1.0, 0.0, 0.0]);
        let ct_dietm = dietm.compute_ct(&aif, 60);

        let mut etm = super::super::Etm::new();
        etm.params_mut().set_values(&[0.25, 0.3, 0.05, 0.0]);
        let ct_etm = etm.compute_ct(&aif, 60);

        for (a, b) in ct_dietm.iter().zip(ct_etm.iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn check_params_flags_violation() {
        let mut model = Dietm::new();
        model.params_mut().set_values(&[0.2, 0.7, 0.6, 0.5, 0.0, 0.0]);
        assert_eq!(model.check_params(), ErrorCode::DceInvalidParam);
    }
}
