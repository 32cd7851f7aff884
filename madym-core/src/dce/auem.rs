//! Dual-input biexponential model with intra-/extracellular transit times,
//! parameterised by plasma flow F_p, extracellular volume fraction v_ecs,
//! the hepatocyte uptake rate k_i and the biliary efflux rate k_ef.

use crate::aif::Aif;
use crate::error_tracker::ErrorCode;

use super::{biexponential, mix_vifs, DceModel, ModelParams};

pub struct Auem {
    params: ModelParams,
}

impl Auem {
    pub fn new() -> Self {
        Self {
            params: ModelParams::new(
                vec!["F_p", "v_ecs", "k_i", "k_ef", "f_a", "tau_a", "tau_v"],
                vec![0.6, 0.2, 0.2, 0.1, 0.5, 0.025, 0.0],
                vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.5],
                vec![10.0, 1.0, 10.0, 10.0, 1.0, 0.5, 0.5],
            ),
        }
    }
}

impl Default for Auem {
    fn default() -> Self {
        Self::new()
    }
}

impl DceModel for Auem {
    fn name(&self) -> &'static str {
        "AUEM"
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
        let (f_p, v_ecs, k_i, k_ef, f_a, tau_a, tau_v) = (v[0], v[1], v[2], v[3], v[4], v[5], v[6]);
        if v.iter().any(|p| !p.is_finite()) {
            return ct;
        }

        // Derived compartment rates/fractions (hepatic uptake model).
        let t_e = v_ecs / (f_p + k_i);
        let v_i = 1.0 - v_ecs;
        let t_i = v_i / k_ef;
        let e_i = k_i / (f_p + k_i);
        let e_pos = e_i / (1.0 - t_e / t_i);

        let k_neg = 1.0 / t_e;
        let f_neg = f_p * (1.0 - e_pos);
        let k_pos = 1.0 / t_i;
        let f_pos = f_p * e_pos;

        if [k_neg, f_neg, k_pos, f_pos].iter().any(|v| !v.is_finite()) {
            return ct;
        }

        let mut aif = aif.clone();
        let cp = mix_vifs(&mut aif, f_a, tau_a, tau_v);
        let combined = biexponential(f_pos, f_neg, k_pos, k_neg, &cp, aif.times_min());
        for i in 0..n_times {
            if !combined[i].is_finite() {
                return ct;
            }
            ct[i] = combined[i];
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
    fn ct_starts_at_zero_and_is_finite() {
        let times: Vec<f64> = (0..60).map(|i| i as f64 * 5.0 / 60.0).collect();
        let aif = Aif::new(times);
        let mut model = Auem::new();
        model.params_mut().set_values(&[0.6, 0.2, 0.2, 0.1, 0.5, 0.025, 0.0]);
        let ct = model.compute_ct(&aif, 60);
        assert_eq!(ct[0], 0.0);
        assert!(ct.iter().all(|v| v.is_finite()));
    }
}
