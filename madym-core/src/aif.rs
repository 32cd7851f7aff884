//! Arterial (and portal-venous) input functions.
//!
//! An [`Aif`] owns the dynamic time grid and produces a resampled
//! concentration series for a given bolus-arrival delay, either from a
//! closed-form population model (Parker 2006, or the legacy Weinmann
//! biexponential), from a baseline sequence loaded elsewhere (`madym-io`
//! parses the ASCII file; this type only resamples whatever baseline it is
//! given), or as a per-voxel averaged map via [`Aif::compute_auto_aif`].

/// Which source backs the resampled arterial series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AifKind {
    /// Parker et al. MRM 56:993 (2006) population form.
    Population,
    /// A baseline sequence loaded from an external file.
    File,
    /// Derived by averaging candidate blood voxels ([`Aif::compute_auto_aif`]).
    Map,
    /// The older Weinmann biexponential population form. Carried forward as
    /// a selectable formula with no default caller.
    Legacy,
    Invalid,
}

/// Which source backs the resampled portal-venous series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PifKind {
    /// Convolves the (resampled) AIF with a cached hepatic impulse response.
    Population,
    File,
    Invalid,
}

/// Parker et al. MRM 56:993 (2006) population AIF coefficients.
mod parker {
    pub const A1: f64 = 5.7326;
    pub const MU1: f64 = 0.17046;
    pub const SIGMA1: f64 = 0.0563;
    pub const A2: f64 = 0.9974;
    pub const MU2: f64 = 0.365;
    pub const SIGMA2: f64 = 0.132;
    pub const ALPHA: f64 = 1.050;
    pub const BETA: f64 = 0.1685;
    pub const S: f64 = 38.078;
    pub const TAU: f64 = 0.483;
}

/// Weinmann biexponential population AIF coefficients.
mod weinmann {
    pub const ALPHA1: f64 = 3.99;
    pub const BETA1: f64 = 0.144;
    pub const ALPHA2: f64 = 4.78;
    pub const BETA2: f64 = 0.0111;
}

/// Hepatic portal impulse-response breakpoints (Anita's model).
mod pif_irf {
    pub const RAMP_START: f64 = 0.08;
    pub const RAMP_END: f64 = 0.17;
    pub const RAMP_SLOPE: f64 = 24.16;
    pub const RAMP_INTERCEPT: f64 = -2.01;
    pub const EXP1_A: f64 = 2.83;
    pub const EXP1_K: f64 = -10.80;
    pub const EXP2_A: f64 = 2.12;
    pub const EXP2_K: f64 = -1.82;
}

/// Linearly interpolate `series` (sampled at `times`, assumed sorted
/// ascending) at `t`. Zero left of the series, last value held right of it.
fn interp_zero_left_hold_right(times: &[f64], series: &[f64], t: f64) -> f64 {
    if t <= times[0] {
        return 0.0;
    }
    if t >= *times.last().unwrap() {
        return *series.last().unwrap();
    }
    for j in 1..times.len() {
        if t <= times[j] {
            let dt = times[j] - times[j - 1];
            let frac = if dt.abs() < f64::EPSILON {
                0.0
            } else {
                (t - times[j - 1]) / dt
            };
            return series[j - 1] + frac * (series[j] - series[j - 1]);
        }
    }
    *series.last().unwrap()
}

/// The arterial (and optional portal) input function.
#[derive(Debug, Clone)]
pub struct Aif {
    times_min: Vec<f64>,
    base_aif: Option<Vec<f64>>,
    base_pif: Option<Vec<f64>>,
    resampled_aif: Vec<f64>,
    resampled_pif: Vec<f64>,
    pif_irf: Vec<f64>,
    aif_kind: AifKind,
    pif_kind: PifKind,
    hct: f64,
    prebolus: usize,
    dose: f64,
}

impl Aif {
    /// `times_min` is the dynamic time grid in minutes, relative to its own
    /// first entry (matching `setAIFTimes`'s zero-basing).
    pub fn new(times_min: Vec<f64>) -> Self {
        let t0 = times_min.first().copied().unwrap_or(0.0);
        let times_min: Vec<f64> = times_min.iter().map(|t| t - t0).collect();
        let n = times_min.len();
        Self {
            times_min,
            base_aif: None,
            base_pif: None,
            resampled_aif: vec![0.0; n],
            resampled_pif: vec![0.0; n],
            pif_irf: Vec::new(),
            aif_kind: AifKind::Population,
            pif_kind: PifKind::Invalid,
            hct: 0.42,
            prebolus: 8,
            dose: 0.1,
        }
    }

    pub fn times_min(&self) -> &[f64] {
        &self.times_min
    }

    pub fn aif(&self) -> &[f64] {
        &self.resampled_aif
    }

    pub fn pif(&self) -> &[f64] {
        &self.resampled_pif
    }

    pub fn kind(&self) -> AifKind {
        self.aif_kind
    }

    pub fn pif_kind(&self) -> PifKind {
        self.pif_kind
    }

    pub fn set_hct(&mut self, hct: f64) {
        self.hct = hct;
    }

    pub fn hct(&self) -> f64 {
        self.hct
    }

    pub fn set_prebolus(&mut self, prebolus: usize) {
        self.prebolus = prebolus;
    }

    pub fn prebolus(&self) -> usize {
        self.prebolus
    }

    pub fn set_dose(&mut self, dose: f64) {
        self.dose = dose;
    }

    pub fn dose(&self) -> f64 {
        self.dose
    }

    /// Installs a baseline AIF sequence already parsed by the I/O layer and
    /// switches the type tag to [`AifKind::File`]. `values.len()` must equal
    /// the dynamic time grid length.
    pub fn set_baseline_aif(&mut self, values: Vec<f64>) {
        self.base_aif = Some(values);
        self.aif_kind = AifKind::File;
    }

    pub fn set_baseline_pif(&mut self, values: Vec<f64>) {
        self.base_pif = Some(values);
        self.pif_kind = PifKind::File;
    }

    pub fn set_kind(&mut self, kind: AifKind) {
        self.aif_kind = kind;
    }

    pub fn set_pif_kind(&mut self, kind: PifKind) {
        self.pif_kind = kind;
    }

    /// The sequence an I/O layer should persist: the baseline if one is
    /// loaded, otherwise whatever was last resampled.
    pub fn sequence_to_save(&self) -> &[f64] {
        match &self.base_aif {
            Some(v) => v,
            None => &self.resampled_aif,
        }
    }

    pub fn pif_sequence_to_save(&self) -> &[f64] {
        match &self.base_pif {
            Some(v) => v,
            None => &self.resampled_pif,
        }
    }

    /// Resamples the arterial input at `t_i + delay_min` for every grid time
    /// `t_i`, dispatching on [`AifKind`]. Idempotent w.r.t. the same delay.
    pub fn resample_aif(&mut self, delay_min: f64) {
        match self.aif_kind {
            AifKind::Legacy => self.resample_weinmann(delay_min),
            AifKind::File => self.resample_file_aif(delay_min),
            AifKind::Population | AifKind::Map => self.resample_parker(delay_min),
            AifKind::Invalid => {}
        }
    }

    /// Resamples the portal input, convolving the (already resampled) AIF
    /// with a cached hepatic impulse response for the population case.
    pub fn resample_pif(&mut self, delay_min: f64, offset_aif: bool, resample_irf: bool) {
        match self.pif_kind {
            PifKind::File => self.resample_file_pif(delay_min),
            PifKind::Population => self.resample_hepatic_pif(delay_min, offset_aif, resample_irf),
            PifKind::Invalid => {}
        }
    }

    fn resample_parker(&mut self, delay_min: f64) {
        let n = self.times_min.len();
        if n == 0 || self.prebolus == 0 {
            return;
        }
        let offset_times: Vec<f64> = self.times_min.iter().map(|t| t + delay_min).collect();
        let arrival = offset_times[self.prebolus - 1];
        let scale = (self.dose / 0.1) / (1.0 - self.hct);
        let mut out = vec![0.0; n];
        for i in 0..n {
            let t = self.times_min[i];
            let d1 = t - parker::MU1 - arrival;
            let d2 = t - parker::MU2 - arrival;
            let gaussian1 = parker::A1 * (-0.5 * d1 * d1 / (parker::SIGMA1 * parker::SIGMA1)).exp();
            let gaussian2 = parker::A2 * (-0.5 * d2 * d2 / (parker::SIGMA2 * parker::SIGMA2)).exp();
            let sigmoid = parker::ALPHA * (-parker::BETA * (t - arrival)).exp()
                / (1.0 + (-parker::S * (t - parker::TAU - arrival)).exp());
            out[i] = scale * (gaussian1 + gaussian2 + sigmoid);
        }
        self.resampled_aif = out;
    }

    fn resample_weinmann(&mut self, delay_min: f64) {
        let n = self.times_min.len();
        if n == 0 {
            return;
        }
        let offset_times: Vec<f64> = self.times_min.iter().map(|t| t + delay_min).collect();
        let mut raw = vec![0.0; n];
        for i in 1..n {
            if i < self.prebolus {
                raw[i] = 0.0;
            } else {
                raw[i] = self.dose
                    * (weinmann::ALPHA1 * (-weinmann::BETA1 * self.times_min[i - 1]).exp()
                        + weinmann::ALPHA2 * (-weinmann::BETA2 * self.times_min[i - 1]).exp());
            }
        }
        let mut out = vec![0.0; n];
        for i in 1..n {
            if self.times_min[i] <= offset_times[0] {
                out[i] = 0.0;
                continue;
            }
            for j in 1..n {
                if self.times_min[i] > offset_times[j - 1] && self.times_min[i] <= offset_times[j]
                {
                    let dt = offset_times[j] - offset_times[j - 1];
                    let remainder = self.times_min[i] - offset_times[j - 1];
                    let frac = if dt.abs() < f64::EPSILON {
                        0.0
                    } else {
                        remainder / dt
                    };
                    out[i] = frac * raw[j] + (1.0 - frac) * raw[j - 1];
                    break;
                }
            }
        }
        self.resampled_aif = out;
    }

    fn resample_file_aif(&mut self, delay_min: f64) {
        let Some(base) = self.base_aif.clone() else {
            return;
        };
        self.resampled_aif = self.resample_loaded(&base, delay_min);
    }

    fn resample_file_pif(&mut self, delay_min: f64) {
        let Some(base) = self.base_pif.clone() else {
            return;
        };
        self.resampled_pif = self.resample_loaded(&base, delay_min);
    }

    /// Piecewise-linear resample of a file-loaded series: zero extrapolation
    /// left of the series, last-value extrapolation right.
    fn resample_loaded(&self, loaded: &[f64], delay_min: f64) -> Vec<f64> {
        let shifted_times: Vec<f64> = self.times_min.iter().map(|t| t + delay_min).collect();
        self.times_min
            .iter()
            .map(|&t| interp_zero_left_hold_right(&shifted_times, loaded, t))
            .collect()
    }

    fn resample_hepatic_pif(&mut self, delay_min: f64, offset_aif: bool, resample_irf: bool) {
        let n = self.times_min.len();
        if offset_aif || self.resampled_aif.len() != n {
            self.resample_aif(delay_min);
        }
        if resample_irf || self.pif_irf.len() != n {
            let mut irf = vec![0.0; n];
            let mut sum = 0.0;
            for i in 0..n {
                let t = self.times_min[i] - delay_min;
                irf[i] = if t < pif_irf::RAMP_START {
                    0.0
                } else if t < pif_irf::RAMP_END {
                    pif_irf::RAMP_SLOPE * t + pif_irf::RAMP_INTERCEPT
                } else {
                    pif_irf::EXP1_A * (pif_irf::EXP1_K * t).exp()
                        + pif_irf::EXP2_A * (pif_irf::EXP2_K * t).exp()
                };
                sum += irf[i];
            }
            if sum.abs() > f64::EPSILON {
                for v in irf.iter_mut() {
                    *v /= sum;
                }
            }
            self.pif_irf = irf;
        }
        let mut out = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            let mut k = i;
            for j in 0..=i {
                acc += self.resampled_aif[j] * self.pif_irf[k];
                if k == 0 {
                    break;
                }
                k -= 1;
            }
            out[i] = acc;
        }
        self.resampled_pif = out;
    }

    /// Averages the per-voxel concentration curve `conc_per_voxel` over the
    /// voxels with the highest `peak_signal`, per §4.1's `computeAutoAIF`:
    /// keeps the top `select_pct` fraction by peak signal, averages
    /// pointwise, divides by `(1 - Hct)`, clamps negatives to zero. Returns
    /// the mean curve and the indices (into `conc_per_voxel`) that were kept.
    pub fn compute_auto_aif(
        &mut self,
        candidates: &[(usize, f64, Vec<f64>)],
        select_pct: f64,
    ) -> Option<(Vec<f64>, Vec<usize>)> {
        if candidates.is_empty() {
            return None;
        }
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            candidates[b]
                .1
                .partial_cmp(&candidates[a].1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let n_keep = ((select_pct * candidates.len() as f64) as usize).max(1);
        let n_times = self.times_min.len();
        let mut mean = vec![0.0; n_times];
        let mut kept = Vec::with_capacity(n_keep);
        for &idx in order.iter().take(n_keep) {
            let (voxel_index, _, ref curve) = candidates[idx];
            for i in 0..n_times {
                mean[i] += curve[i] / (1.0 - self.hct);
            }
            kept.push(voxel_index);
        }
        let n = n_keep as f64;
        for v in mean.iter_mut() {
            *v /= n;
            if *v < 0.0 {
                *v = 0.0;
            }
        }
        self.base_aif = Some(mean.clone());
        self.aif_kind = AifKind::Map;
        Some((mean, kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn time_grid() -> Vec<f64> {
        (0..60).map(|i| i as f64 * 0.5).collect()
    }

    #[test]
    fn delay_zero_is_identity_within_rounding() {
        let mut a = Aif::new(time_grid());
        a.resample_aif(0.0);
        let at_zero = a.aif().to_vec();
        let mut b = Aif::new(time_grid());
        b.resample_aif(0.0);
        b.resample_aif(0.0);
        assert_relative_eq!(at_zero.as_slice(), b.aif(), epsilon = 1e-9);
    }

    #[test]
    fn resample_is_linear_in_dose() {
        let mut a = Aif::new(time_grid());
        a.set_dose(0.1);
        a.resample_aif(0.0);
        let base: Vec<f64> = a.aif().to_vec();

        let mut b = Aif::new(time_grid());
        b.set_dose(0.2);
        b.resample_aif(0.0);
        for (x, y) in base.iter().zip(b.aif().iter()) {
            assert_relative_eq!(*y, 2.0 * x, epsilon = 1e-9);
        }
    }

    #[test]
    fn file_resample_holds_last_value_right_and_zero_left() {
        let mut a = Aif::new(vec![0.0, 1.0, 2.0, 3.0]);
        a.set_baseline_aif(vec![0.0, 1.0, 2.0, 3.0]);
        a.resample_aif(10.0);
        assert!(a.aif().iter().all(|&v| v == 0.0));

        let mut b = Aif::new(vec![0.0, 1.0, 2.0, 3.0]);
        b.set_baseline_aif(vec![0.0, 1.0, 2.0, 3.0]);
        b.resample_aif(-10.0);
        assert!(b.aif().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn auto_aif_keeps_top_fraction_by_peak() {
        let mut aif = Aif::new((0..10).map(|i| i as f64).collect());
        let mut candidates = Vec::new();
        for v in 0..100 {
            let peak = if v < 5 { 1.0 } else { 0.5 };
            candidates.push((v, peak, vec![peak; 10]));
        }
        let (mean, kept) = aif.compute_auto_aif(&candidates, 0.05).unwrap();
        assert_eq!(kept.len(), 5);
        let expected = 1.0 / (1.0 - aif.hct());
        assert_relative_eq!(mean[0], expected, epsilon = 1e-9);
    }
}
