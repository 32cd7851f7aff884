//! Per-voxel DCE pipeline: signal→concentration conversion, IAUC, and the
//! enhancement test (§4.5). Carries its own status enum, distinct from both
//! [`crate::error_tracker::ErrorCode`] and [`crate::dwi::DwiErrorCode`].

use std::f64::consts::PI;

/// Per-voxel DCE status. Maps onto an [`crate::error_tracker::ErrorCode`]
/// bit on integration into the volume-wide tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoxelStatus {
    Ok,
    CaNan,
    DynT1Bad,
    M0Bad,
    T10Bad,
    NonEnhancing,
}

/// Converts dynamic signal intensities to contrast-agent concentration,
/// computes IAUC summaries and the enhancement test.
pub struct DceVoxel {
    signal: Vec<f64>,
    ct: Vec<f64>,
    t10_ms: f64,
    m0: f64,
    r1_const: f64,
    injection_image: usize,
    dynamic_times_min: Vec<f64>,
    tr_ms: f64,
    fa_deg: f64,
    use_m0_ratio: bool,
    status: VoxelStatus,
}

const T1_TOLERANCE: f64 = 1.0e-6;

impl DceVoxel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal: Vec<f64>,
        t10_ms: f64,
        m0: f64,
        r1_const: f64,
        injection_image: usize,
        dynamic_times_min: Vec<f64>,
        tr_ms: f64,
        fa_deg: f64,
        use_m0_ratio: bool,
    ) -> Self {
        Self {
            signal,
            ct: Vec::new(),
            t10_ms,
            m0,
            r1_const,
            injection_image,
            dynamic_times_min,
            tr_ms,
            fa_deg,
            use_m0_ratio,
            status: VoxelStatus::Ok,
        }
    }

    pub fn status(&self) -> VoxelStatus {
        self.status
    }

    pub fn ct(&self) -> &[f64] {
        &self.ct
    }

    /// Converts the installed signal series to concentration, consuming
    /// prebolus timepoints [0, injection_image) to estimate the baseline
    /// scale when `use_m0_ratio` is set.
    pub fn compute_ct_from_signal(&mut self) {
        let r1gd = self.r1_const * 0.001;
        let n_times = self.signal.len();
        self.ct = vec![0.0; n_times];

        if self.t10_ms <= 0.0 {
            self.status = VoxelStatus::T10Bad;
            return;
        }

        let fa_rad = self.fa_deg * PI / 180.0;
        let sinfa = fa_rad.sin();
        let cosfa = fa_rad.cos();

        if self.injection_image == 0 {
            self.status = VoxelStatus::M0Bad;
            return;
        }

        if self.use_m0_ratio {
            let s_pbm: f64 = self.signal[..self.injection_image].iter().sum::<f64>()
                / self.injection_image as f64;
            for k in 0..n_times {
                let (r1, ok) = self.compute_t1_dyn_pbm(self.signal[k], s_pbm, cosfa);
                self.ct[k] = (r1 - 1.0 / self.t1_per_ms()) / r1gd;
                if !ok {
                    self.status = VoxelStatus::DynT1Bad;
                } else if self.ct[k].is_nan() {
                    self.status = VoxelStatus::CaNan;
                }
            }
        } else {
            for k in 0..n_times {
                let (r1, ok) = self.compute_t1_dyn_m0(self.signal[k], sinfa, cosfa);
                self.ct[k] = (r1 - 1.0 / self.t1_per_ms()) / r1gd;
                if !ok {
                    self.status = VoxelStatus::DynT1Bad;
                } else if self.ct[k].is_nan() {
                    self.status = VoxelStatus::CaNan;
                }
            }
        }
    }

    fn t1_per_ms(&self) -> f64 {
        self.t10_ms
    }

    fn compute_t1_dyn_pbm(&self, st: f64, s_pbm: f64, cosfa: f64) -> (f64, bool) {
        if s_pbm < T1_TOLERANCE {
            return (f64::NAN, false);
        }
        let e_tr_t10 = (-self.tr_ms / self.t10_ms).exp();
        let s1_m0 = st / s_pbm;

        let denom1 = 1.0 - cosfa * e_tr_t10;
        if denom1.abs() < T1_TOLERANCE {
            return (f64::NAN, false);
        }
        let fraction1 = (1.0 - e_tr_t10) / denom1;

        let denom2 = 1.0 - s1_m0 * cosfa * fraction1;
        if denom2.abs() < T1_TOLERANCE {
            return (f64::NAN, false);
        }
        let fraction2 = (1.0 - s1_m0 * fraction1) / denom2;
        if fraction2.abs() < T1_TOLERANCE {
            return (f64::NAN, false);
        }

        let r1 = fraction2.ln() / -self.tr_ms;
        if r1 < 0.0 || 1.0 / r1 > 1.0e9 {
            return (r1, false);
        }
        (r1, true)
    }

    fn compute_t1_dyn_m0(&self, st: f64, sinfa: f64, cosfa: f64) -> (f64, bool) {
        if self.m0 <= 0.0 {
            return (f64::NAN, false);
        }
        let num = self.m0 * sinfa - st;
        let denom = self.m0 * sinfa - st * cosfa;
        let r1 = -(num / denom).ln() / self.tr_ms;
        let ok = num.abs() >= T1_TOLERANCE && denom.abs() >= T1_TOLERANCE;
        (r1, ok)
    }

    /// Trapezoid-integrates C(t) from the bolus-arrival time to
    /// bolus_time+τ for every τ in `times_min`, linearly interpolating the
    /// final partial step. `times_min` must be sorted ascending.
    pub fn compute_iauc(&self, times_min: &[f64]) -> Vec<f64> {
        let n_iauc = times_min.len();
        let mut vals = vec![0.0; n_iauc];
        if n_iauc == 0 || self.ct.is_empty() {
            return vals;
        }

        let n_times = self.dynamic_times_min.len();
        let bolus_time = self.dynamic_times_min[self.injection_image];

        let mut cumulative = 0.0;
        let mut curr = 0usize;
        for i_t in (self.injection_image + 1)..n_times {
            let elapsed = self.dynamic_times_min[i_t] - bolus_time;
            let delta_t = self.dynamic_times_min[i_t] - self.dynamic_times_min[i_t - 1];
            let delta_ct = self.ct[i_t] + self.ct[i_t - 1];
            let added = delta_t * delta_ct / 2.0;

            if elapsed > times_min[curr] {
                let t_frac = 1.0 - (elapsed - times_min[curr]) / delta_t;
                vals[curr] = cumulative + t_frac * added;
                if curr == n_iauc - 1 {
                    break;
                }
                curr += 1;
            }
            cumulative += added;
        }
        vals
    }

    /// True unless every requested IAUC value is non-positive, in which
    /// case this also sets [`VoxelStatus::NonEnhancing`].
    pub fn check_enhancing(&mut self, iauc_vals: &[f64]) -> bool {
        let enhancing = if iauc_vals.is_empty() {
            let iauc60 = self.compute_iauc(&[1.0]);
            iauc60[0] > 0.0
        } else {
            iauc_vals.iter().all(|&v| v > 0.0)
        };
        if !enhancing {
            self.status = VoxelStatus::NonEnhancing;
        }
        enhancing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_signal(t1_ms: f64, m0: f64, fa_deg: f64, tr_ms: f64) -> f64 {
        let fa = fa_deg * PI / 180.0;
        let e = (-tr_ms / t1_ms).exp();
        m0 * fa.sin() * (1.0 - e) / (1.0 - fa.cos() * e)
    }

    #[test]
    fn flat_signal_yields_zero_concentration() {
        let t1 = 1200.0;
        let m0 = 2000.0;
        let fa = 15.0;
        let tr = 4.0;
        let s = forward_signal(t1, m0, fa, tr);
        let signal = vec![s; 20];
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 5.0 / 60.0).collect();
        let mut voxel = DceVoxel::new(signal, t1, m0, 3.4, 8, times, tr, fa, false);
        voxel.compute_ct_from_signal();
        assert_eq!(voxel.status(), VoxelStatus::Ok);
        for &c in voxel.ct() {
            assert!(c.abs() < 1e-6);
        }
    }

    #[test]
    fn nonpositive_t10_is_rejected() {
        let signal = vec![100.0; 10];
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut voxel = DceVoxel::new(signal, 0.0, 1000.0, 3.4, 4, times, 4.0, 15.0, false);
        voxel.compute_ct_from_signal();
        assert_eq!(voxel.status(), VoxelStatus::T10Bad);
    }

    #[test]
    fn enhancement_test_flags_non_enhancing() {
        let signal = vec![100.0; 10];
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut voxel = DceVoxel::new(signal, 1000.0, 1000.0, 3.4, 4, times, 4.0, 15.0, false);
        voxel.compute_ct_from_signal();
        let enhancing = voxel.check_enhancing(&[0.0]);
        assert!(!enhancing);
        assert_eq!(voxel.status(), VoxelStatus::NonEnhancing);
    }
}
