//! Extended Tofts model: Cm = vp·Ca + Ktrans·∫₀ᵗ Ca(s)·e^{-kep(t-s)} ds,
//! kep = Ktrans/vₑ.

use crate::aif::Aif;
use crate::error_tracker::ErrorCode;

use super::{convolve, DceModel, ModelParams};

pub struct Etm {
    params: ModelParams,
}

impl Etm {
    pub fn new() -> Self {
        Self {
            params: ModelParams::new(
                vec!["Ktrans", "v_e", "v_p", "tau_a"],
                vec![0.2, 0.2, 0.2, 0.0],
                vec![0.0, 0.0, 0.0, 0.0],
                vec![10.0, 1.0, 1.0, 0.5],
            ),
        }
    }

    /// Design matrix for the linear-least-squares form of this model:
    /// columns are ∫Cₚ, −∫Cₜ, Cₚ, flattened row-major (3 entries per
    /// time-point). `ct_signal` is the measured (not modelled) Cₜ(t).
    pub fn make_lls_matrix(&self, aif: &Aif, ct_signal: &[f64]) -> Vec<f64> {
        let tau_a = self.params.values()[3];
        let mut aif = aif.clone();
        aif.resample_aif(tau_a);
        let cp = aif.aif();
        let t = aif.times_min();

        let cp_int = trapz_integral(cp, t);
        let ct_int = trapz_integral(ct_signal, t);

        let mut a = Vec::with_capacity(t.len() * 3);
        for i in 0..t.len() {
            a.push(cp_int[i]);
            a.push(-ct_int[i]);
            a.push(cp[i]);
        }
        a
    }

    /// Converts the 3 linear coefficients (B0, B1, B2) back to
    /// (Ktrans, vₑ, vₚ): k2=B1, vp=B2, Ktrans=B0-k2·vp, ve=Ktrans/k2.
    pub fn transform_lls_solution(&mut self, b: &[f64; 3]) {
        let k2 = b[1];
        let vp = b[2];
        let ktrans = b[0] - k2 * vp;
        let ve = ktrans / k2;
        self.params.set_values(&[ktrans, ve, vp, self.params.values()[3]]);
    }
}

impl Default for Etm {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative trapezoidal integral of `f` over `t`: result[i] = ∫₀^{t_i} f.
fn trapz_integral(f: &[f64], t: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut out = vec![0.0; n];
    for i in 1..n {
        let delta = t[i] - t[i - 1];
        out[i] = out[i - 1] + delta * 0.5 * (f[i] + f[i - 1]);
    }
    out
}

impl DceModel for Etm {
    fn name(&self) -> &'static str {
        "ETM"
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
        let (ktrans, ve, vp, tau_a) = (v[0], v[1], v[2], v[3]);
        if [ktrans, ve, vp, tau_a].iter().any(|p| !p.is_finite()) {
            return ct;
        }

        let mut aif = aif.clone();
        aif.resample_aif(tau_a);
        let ca = aif.aif();

        if ve == 0.0 || ktrans == 0.0 {
            for i in 0..n_times {
                ct[i] = vp * ca[i];
            }
            return ct;
        }

        let kep = ktrans / ve;
        let f = convolve(ca, aif.times_min(), kep);

        ct[0] = vp * ca[0];
        for i in 1..n_times {
            let c_t = vp * ca[i] + ktrans * f[i];
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
        // Indices 1 (v_e) and 2 (v_p) — see module docs for why this departs
        // from the legacy index-3 lookup.
        let ve_plus_vp = v[1] + v[2];
        if ve_plus_vp > 1.0 {
            return ErrorCode::DceInvalidParam;
        }
        ErrorCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration_times() -> Vec<f64> {
        (0..60).map(|i| i as f64 * 5.0 / 60.0).collect()
    }

    #[test]
    fn kep_zero_rate_reduces_to_patlak_form() {
        let aif = Aif::new(calibration_times());
        let mut model = Etm::new();
        model.params_mut().set_values(&[0.0, 0.2, 0.3, 0.0]);
        let ct = model.compute_ct(&aif, 60);
        let mut aif2 = aif.clone();
        aif2.resample_aif(0.0);
        for (c, ca) in ct.iter().zip(aif2.aif().iter()) {
            assert_relative_eq!(c, &(0.3 * ca), epsilon = 1e-10);
        }
    }

    #[test]
    fn check_params_flags_physiological_violation() {
        let mut model = Etm::new();
        model.params_mut().set_values(&[0.2, 0.7, 0.6, 0.0]);
        assert_eq!(model.check_params(), ErrorCode::DceInvalidParam);

        model.params_mut().set_values(&[0.2, 0.3, 0.2, 0.0]);
        assert_eq!(model.check_params(), ErrorCode::Ok);
    }

    #[test]
    fn lls_round_trip_recovers_parameters() {
        let aif = Aif::new(calibration_times());
        let mut model = Etm::new();
        let truth = [0.25, 0.3, 0.05, 0.0];
        model.params_mut().set_values(&truth);
        let ct = model.compute_ct(&aif, 60);

        let a = model.make_lls_matrix(&aif, &ct);
        // Re-derive B by evaluating the model equation algebraically rather
        // than solving the normal equations here (no linear-algebra solve
        // dependency in this crate beyond nalgebra's dense facilities, kept
        // for the optimiser): Ktrans, v_e, v_p are known, so B is computed
        // forward and only the inverse transform is exercised.
        let k2 = truth[0] / truth[1];
        let b = [truth[0] - k2 * truth[2] + k2 * truth[2], k2, truth[2]];
        model.transform_lls_solution(&b);
        assert_relative_eq!(model.params().values()[0], truth[0], epsilon = 1e-8);
        assert_relative_eq!(model.params().values()[2], truth[2], epsilon = 1e-8);
        assert!(a.len() == 60 * 3);
    }
}
