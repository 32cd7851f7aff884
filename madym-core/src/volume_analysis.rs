//! Volume-wide orchestration (§4.7): owns the dynamic series, AIF, T1/M0/B1
//! maps, the selected DCE model, the ROI, the ErrorTracker and the output
//! parameter maps, and drives the per-voxel fit loop in parallel.

use std::collections::HashMap;

use madym_optim::OptimiserKind;
use rayon::prelude::*;
use tracing::info;

use crate::aif::Aif;
use crate::dce::{model_by_name, DceModel};
use crate::dce_fitter::{fit_model, fit_model_with_repeats, FitOptions};
use crate::dce_voxel::{DceVoxel, VoxelStatus};
use crate::error::Error;
use crate::error_tracker::{ErrorCode, ErrorTracker};
use crate::image3d::{column_major, Image3D, ImageType};

/// Voxel labels written into the `AifMap` [`VolumeAnalysis::compute_auto_aif`]
/// returns, matching §4.1's SELECTED / USED / INVALID_CT tags (0 = not a
/// candidate: outside the subvolume or below `min_t1_blood_ms`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AifMapLabel {
    NotCandidate = 0,
    InvalidCt = 1,
    Selected = 2,
    Used = 3,
}

/// Selection criteria for [`VolumeAnalysis::compute_auto_aif`] (§4.1's
/// `computeAutoAIF`). `subvolume` restricts the candidate search to
/// `([x0,x1), [y0,y1), [z0,z1))`; `None` searches the whole volume.
#[derive(Debug, Clone)]
pub struct AutoAifCriteria {
    pub subvolume: Option<([usize; 2], [usize; 2], [usize; 2])>,
    pub min_t1_blood_ms: f64,
    pub peak_time_min: f64,
    pub select_pct: f64,
}

impl Default for AutoAifCriteria {
    fn default() -> Self {
        Self {
            subvolume: None,
            min_t1_blood_ms: 1000.0,
            peak_time_min: 1.0,
            select_pct: 0.05,
        }
    }
}

/// Per-voxel overrides applied after a fresh model instance is built:
/// fixed-parameter values, relative bound widths, and an optional
/// repeat-parameter sweep.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_name: String,
    pub fixed_params: Vec<(usize, Option<f64>)>,
    pub relative_bounds: Vec<(usize, f64)>,
    pub repeat_param: Option<(usize, Vec<f64>)>,
    pub optimiser: OptimiserKind,
    pub max_iterations: usize,
    /// §4.6's residual window `[first, last)`, as indices into the dynamic
    /// time grid. `None` uses the full series.
    pub residual_window: Option<(usize, usize)>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            fixed_params: Vec::new(),
            relative_bounds: Vec::new(),
            repeat_param: None,
            optimiser: OptimiserKind::default(),
            max_iterations: 500,
            residual_window: None,
        }
    }
}

impl ModelConfig {
    fn build(&self) -> Result<Box<dyn DceModel>, Error> {
        let mut model = model_by_name(&self.model_name)?;
        for &(idx, value) in &self.fixed_params {
            model.params_mut().fix(idx, value);
        }
        for &(idx, width) in &self.relative_bounds {
            model.params_mut().set_relative_bound(idx, width);
        }
        Ok(model)
    }
}

/// Outcome of fitting a single voxel, before it is scattered into the
/// volume-wide output maps.
struct VoxelOutcome {
    theta: Vec<f64>,
    sse: f64,
    iauc: Vec<f64>,
    enhancing: bool,
    status_bits: i32,
    /// False when residual-gating rejected this voxel's new fit: its
    /// parameter map entry must be left holding the preloaded value rather
    /// than being overwritten.
    params_updated: bool,
}

/// Per-voxel acquisition and relaxometry inputs, sampled once per voxel
/// from the volume's T1/M0/B1 maps.
#[derive(Debug, Clone, Copy)]
pub struct VoxelAcquisition {
    pub t10_ms: f64,
    pub m0: f64,
    pub b1: f64,
    pub tr_ms: f64,
    pub fa_deg: f64,
}

pub struct VolumeAnalysis {
    dims: Option<[usize; 3]>,
    dynamic_times_min: Vec<f64>,
    dynamic_signals: Vec<Image3D>,
    t1_map: Option<Image3D>,
    m0_map: Option<Image3D>,
    b1_map: Option<Image3D>,
    roi: Option<Image3D>,
    aif: Aif,
    injection_image: usize,
    use_m0_ratio: bool,
    test_enhancement: bool,
    optimise_model: bool,
    iauc_times_min: Vec<f64>,
    error_tracker: Option<ErrorTracker>,
    param_maps: HashMap<String, Image3D>,
    iauc_maps: HashMap<String, Image3D>,
    residuals_map: Option<Image3D>,
    enhancing_map: Option<Image3D>,
    init_map_params: Option<HashMap<String, Image3D>>,
    init_residuals: Option<Image3D>,
}

impl VolumeAnalysis {
    pub fn new(dynamic_times_min: Vec<f64>, aif: Aif) -> Self {
        Self {
            dims: None,
            dynamic_times_min,
            dynamic_signals: Vec::new(),
            t1_map: None,
            m0_map: None,
            b1_map: None,
            roi: None,
            aif,
            injection_image: 0,
            use_m0_ratio: false,
            test_enhancement: true,
            optimise_model: true,
            iauc_times_min: Vec::new(),
            error_tracker: None,
            param_maps: HashMap::new(),
            iauc_maps: HashMap::new(),
            residuals_map: None,
            enhancing_map: None,
            init_map_params: None,
            init_residuals: None,
        }
    }

    pub fn dims(&self) -> Option<[usize; 3]> {
        self.dims
    }

    pub fn set_injection_image(&mut self, idx: usize) {
        self.injection_image = idx;
    }

    pub fn set_use_m0_ratio(&mut self, v: bool) {
        self.use_m0_ratio = v;
    }

    pub fn set_test_enhancement(&mut self, v: bool) {
        self.test_enhancement = v;
    }

    pub fn set_optimise_model(&mut self, v: bool) {
        self.optimise_model = v;
    }

    pub fn set_iauc_times_min(&mut self, times: Vec<f64>) {
        self.iauc_times_min = times;
    }

    pub fn set_roi(&mut self, roi: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::set_roi", &roi)?;
        self.roi = Some(roi);
        Ok(())
    }

    pub fn set_t1_map(&mut self, image: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::set_t1_map", &image)?;
        self.t1_map = Some(image);
        Ok(())
    }

    pub fn set_m0_map(&mut self, image: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::set_m0_map", &image)?;
        self.m0_map = Some(image);
        Ok(())
    }

    pub fn set_b1_map(&mut self, image: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::set_b1_map", &image)?;
        self.b1_map = Some(image);
        Ok(())
    }

    /// Preloaded per-voxel initial θ, keyed by parameter name (§4.7's
    /// `initMapParams`). Seeds every voxel's starting parameters instead of
    /// the model's flat default; a name absent from the map falls back to
    /// the model's own default for that index.
    pub fn set_init_map_params(&mut self, maps: HashMap<String, Image3D>) -> Result<(), Error> {
        for image in maps.values() {
            self.check_or_set_dims("VolumeAnalysis::set_init_map_params", image)?;
        }
        self.init_map_params = Some(maps);
        Ok(())
    }

    /// A preloaded residual (SSE) map (§4.7's `modelResiduals` baseline).
    /// Every voxel whose new fit does not beat its loaded residual keeps
    /// its preloaded parameter values and residual instead of being
    /// overwritten, enabling incremental refitting.
    pub fn set_init_residuals(&mut self, image: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::set_init_residuals", &image)?;
        self.init_residuals = Some(image);
        Ok(())
    }

    /// Adds one dynamic-series timepoint. On the first call, records the
    /// reference dimensions; every subsequent image (dynamic or map) must
    /// match or this returns a fatal dimension-mismatch error.
    pub fn add_dynamic_image(&mut self, image: Image3D) -> Result<(), Error> {
        self.check_or_set_dims("VolumeAnalysis::add_dynamic_image", &image)?;
        self.dynamic_signals.push(image);
        Ok(())
    }

    fn check_or_set_dims(&mut self, context: &'static str, image: &Image3D) -> Result<(), Error> {
        match self.dims {
            None => {
                self.dims = Some(image.dims());
                self.error_tracker = Some(ErrorTracker::new(image.dims()));
                Ok(())
            }
            Some(dims) if dims == image.dims() => Ok(()),
            Some(dims) => Err(Error::DimensionMismatch { context, lhs: image.dims(), rhs: dims }),
        }
    }

    pub fn error_tracker(&self) -> Option<&ErrorTracker> {
        self.error_tracker.as_ref()
    }

    pub fn param_map(&self, name: &str) -> Option<&Image3D> {
        self.param_maps.get(name)
    }

    /// Every output parameter map, keyed by parameter name. Lets a caller
    /// (e.g. `madym-io`'s directory writer) enumerate maps without knowing
    /// the active model's parameter names in advance.
    pub fn param_maps(&self) -> &HashMap<String, Image3D> {
        &self.param_maps
    }

    /// Every IAUC map, keyed by `"IAUC<seconds>"`.
    pub fn iauc_maps(&self) -> &HashMap<String, Image3D> {
        &self.iauc_maps
    }

    pub fn residuals_map(&self) -> Option<&Image3D> {
        self.residuals_map.as_ref()
    }

    pub fn enhancing_map(&self) -> Option<&Image3D> {
        self.enhancing_map.as_ref()
    }

    /// Initialises one output Image3D per free model parameter, plus IAUC,
    /// residuals and enhancement maps, all sized to the reference
    /// dimensions. If `init_map_params` is given, it seeds per-voxel initial
    /// θ instead of the model's flat default; `init_residuals`, if given,
    /// gates every voxel's update on beating the loaded residual.
    fn init_output_maps(&mut self, config: &ModelConfig) -> Result<(), Error> {
        let dims = self.dims.ok_or(Error::MissingMetadata {
            context: "VolumeAnalysis::init_output_maps",
            field: "reference dimensions (add at least one dynamic image first)",
        })?;
        let template = config.build()?;
        for &name in template.params().names() {
            if !self.param_maps.contains_key(name) {
                let seeded = self
                    .init_map_params
                    .as_ref()
                    .and_then(|maps| maps.get(name))
                    .cloned()
                    .unwrap_or_else(|| Image3D::new(dims, 0.0));
                self.param_maps.insert(name.to_string(), seeded);
            }
        }
        for &t in &self.iauc_times_min {
            let key = format!("IAUC{}", (t * 60.0).round() as i64);
            self.iauc_maps.entry(key).or_insert_with(|| Image3D::new(dims, 0.0));
        }
        if self.residuals_map.is_none() {
            let seeded = self.init_residuals.clone().unwrap_or_else(|| Image3D::new(dims, 0.0));
            self.residuals_map = Some(seeded);
        }
        self.enhancing_map.get_or_insert_with(|| Image3D::new(dims, 1.0));
        Ok(())
    }

    fn acquisition_at(&self, idx: usize) -> VoxelAcquisition {
        let t1_map = self.t1_map.as_ref();
        let m0_map = self.m0_map.as_ref();
        let b1_map = self.b1_map.as_ref();
        VoxelAcquisition {
            t10_ms: t1_map.map(|m| m.data()[idx]).unwrap_or(0.0),
            m0: m0_map.map(|m| m.data()[idx]).unwrap_or(0.0),
            b1: b1_map.map(|m| m.data()[idx]).unwrap_or(1.0),
            tr_ms: self.dynamic_signals.first().and_then(|i| i.metadata.tr_s).map(|s| s * 1000.0).unwrap_or(0.0),
            fa_deg: self
                .dynamic_signals
                .first()
                .and_then(|i| i.metadata.flip_angle_deg)
                .unwrap_or(0.0),
        }
    }

    fn fit_voxel(&self, idx: usize, config: &ModelConfig, init_theta: Option<&[f64]>, residual_baseline: Option<f64>) -> VoxelOutcome {
        let acq = self.acquisition_at(idx);
        let signal: Vec<f64> = self.dynamic_signals.iter().map(|img| img.data()[idx]).collect();

        let mut voxel = DceVoxel::new(
            signal,
            acq.t10_ms,
            acq.m0,
            acq.b1,
            self.injection_image,
            self.dynamic_times_min.clone(),
            acq.tr_ms,
            acq.fa_deg,
            self.use_m0_ratio,
        );
        voxel.compute_ct_from_signal();

        let mut status_bits = match voxel.status() {
            VoxelStatus::Ok => 0,
            VoxelStatus::CaNan => ErrorCode::CaIsNan.bit(),
            VoxelStatus::DynT1Bad => ErrorCode::DynT1Negative.bit(),
            VoxelStatus::M0Bad => ErrorCode::M0Negative.bit(),
            VoxelStatus::T10Bad => ErrorCode::DceInvalidInput.bit(),
            VoxelStatus::NonEnhancing => ErrorCode::NonEnhIauc.bit(),
        };

        let iauc = voxel.compute_iauc(&self.iauc_times_min);
        let enhancing = if self.test_enhancement {
            let e = voxel.check_enhancing(&iauc);
            if !e {
                status_bits |= ErrorCode::NonEnhIauc.bit();
            }
            e
        } else {
            true
        };

        let n_params = match config.build() {
            Ok(m) => m.params().num_params(),
            Err(_) => 0,
        };

        if !enhancing {
            return VoxelOutcome { theta: vec![0.0; n_params], sse: 0.0, iauc, enhancing, status_bits, params_updated: true };
        }

        let mut model = match config.build() {
            Ok(m) => m,
            Err(_) => {
                return VoxelOutcome {
                    theta: vec![0.0; n_params],
                    sse: 0.0,
                    iauc,
                    enhancing,
                    status_bits: status_bits | ErrorCode::DceFitFail.bit(),
                    params_updated: true,
                }
            }
        };
        if let Some(theta) = init_theta {
            model.params_mut().set_values(theta);
        }

        if !self.optimise_model {
            return VoxelOutcome {
                theta: model.params().values().to_vec(),
                sse: 0.0,
                iauc,
                enhancing,
                status_bits,
                params_updated: true,
            };
        }

        let n_times = voxel.ct().len();
        let (first, last) = config.residual_window.unwrap_or((0, n_times));
        let opts = FitOptions {
            first: first.min(n_times),
            last: last.min(n_times),
            max_iterations: config.max_iterations,
            optimiser: config.optimiser,
        };
        let result = match &config.repeat_param {
            Some((idx, values)) => {
                fit_model_with_repeats(model.as_mut(), &self.aif, voxel.ct(), None, &opts, *idx, values)
            }
            None => fit_model(model.as_mut(), &self.aif, voxel.ct(), None, &opts),
        };

        if result.error != ErrorCode::Ok {
            status_bits |= result.error.bit();
        }

        if let Some(baseline) = residual_baseline {
            if result.sse >= baseline {
                // Residual-gating: this voxel's new fit did not beat the
                // preloaded baseline, so its parameter map entry and
                // residual are left as preloaded rather than overwritten.
                return VoxelOutcome {
                    theta: Vec::new(),
                    sse: baseline,
                    iauc,
                    enhancing,
                    status_bits,
                    params_updated: false,
                };
            }
        }

        VoxelOutcome {
            theta: model.params().values().to_vec(),
            sse: result.sse,
            iauc,
            enhancing,
            status_bits,
            params_updated: true,
        }
    }

    /// Runs the fit loop over every ROI voxel (or every voxel, if no ROI is
    /// set), in parallel, logging progress at ~10% increments.
    pub fn fit_all(&mut self, config: ModelConfig) -> Result<(), Error> {
        self.init_output_maps(&config)?;
        let dims = self.dims.ok_or(Error::MissingMetadata {
            context: "VolumeAnalysis::fit_all",
            field: "reference dimensions (add at least one dynamic image first)",
        })?;
        let n = dims[0] * dims[1] * dims[2];

        let indices: Vec<usize> = match &self.roi {
            Some(roi) => (0..n).filter(|&i| roi.data()[i] != 0.0).collect(),
            None => (0..n).collect(),
        };

        let total = indices.len().max(1);
        let progress_step = (total / 10).max(1);

        let param_names: Vec<String> = config.build()?.params().names().iter().map(|s| s.to_string()).collect();

        let outcomes: Vec<(usize, VoxelOutcome)> = indices
            .par_iter()
            .enumerate()
            .map(|(i, &idx)| {
                if i % progress_step == 0 {
                    info!("volume analysis progress: {}/{}", i, total);
                }
                let init_theta: Option<Vec<f64>> = self.init_map_params.as_ref().map(|maps| {
                    param_names
                        .iter()
                        .map(|name| {
                            maps.get(name)
                                .and_then(|img| img.voxel_linear(idx).ok())
                                .unwrap_or(0.0)
                        })
                        .collect()
                });
                let residual_baseline = self
                    .init_residuals
                    .as_ref()
                    .and_then(|img| img.voxel_linear(idx).ok());
                let outcome = self.fit_voxel(idx, &config, init_theta.as_deref(), residual_baseline);
                (idx, outcome)
            })
            .collect();

        let tracker = self.error_tracker.as_mut().expect("dims set implies tracker set");

        for (idx, outcome) in outcomes {
            if outcome.params_updated {
                for (p, name) in param_names.iter().enumerate() {
                    if let Some(map) = self.param_maps.get_mut(name) {
                        let _ = map.set_voxel_linear(idx, outcome.theta.get(p).copied().unwrap_or(0.0));
                    }
                }
            }
            for (t, key_time) in self.iauc_times_min.iter().enumerate() {
                let key = format!("IAUC{}", (key_time * 60.0).round() as i64);
                if let Some(map) = self.iauc_maps.get_mut(&key) {
                    let _ = map.set_voxel_linear(idx, outcome.iauc.get(t).copied().unwrap_or(0.0));
                }
            }
            if let Some(map) = self.residuals_map.as_mut() {
                let _ = map.set_voxel_linear(idx, outcome.sse);
            }
            if let Some(map) = self.enhancing_map.as_mut() {
                let _ = map.set_voxel_linear(idx, if outcome.enhancing { 1.0 } else { 0.0 });
            }
            tracker.update_voxel(idx, ErrorCode::Ok);
            if outcome.status_bits != 0 {
                for code in [
                    ErrorCode::CaIsNan,
                    ErrorCode::DynT1Negative,
                    ErrorCode::M0Negative,
                    ErrorCode::DceInvalidInput,
                    ErrorCode::NonEnhIauc,
                    ErrorCode::DceFitFail,
                    ErrorCode::DceInvalidParam,
                ] {
                    if outcome.status_bits & code.bit() != 0 {
                        tracker.update_voxel(idx, code);
                    }
                }
            }
        }
        Ok(())
    }

    /// Averages Ct across every voxel where `selector` equals `value`,
    /// skipping voxels the error tracker marks invalid. This is how
    /// auto-AIF collects its final curve.
    pub fn compute_mean_ct(&self, selector: &Image3D, value: f64) -> (Vec<f64>, usize) {
        let n_times = self.dynamic_signals.len();
        let mut mean_ct = vec![0.0; n_times];
        let mut n_good = 0usize;
        let mut n_bad = 0usize;

        for idx in 0..selector.n_voxels() {
            if selector.data()[idx] != value {
                continue;
            }
            if let Some(tracker) = &self.error_tracker {
                if !tracker.is_ok(idx) {
                    n_bad += 1;
                    continue;
                }
            }
            let acq = self.acquisition_at(idx);
            let signal: Vec<f64> = self.dynamic_signals.iter().map(|img| img.data()[idx]).collect();
            let mut voxel = DceVoxel::new(
                signal,
                acq.t10_ms,
                acq.m0,
                acq.b1,
                self.injection_image,
                self.dynamic_times_min.clone(),
                acq.tr_ms,
                acq.fa_deg,
                self.use_m0_ratio,
            );
            voxel.compute_ct_from_signal();
            if voxel.status() != VoxelStatus::Ok {
                n_bad += 1;
                continue;
            }
            for (m, &c) in mean_ct.iter_mut().zip(voxel.ct().iter()) {
                *m += c;
            }
            n_good += 1;
        }

        if n_good > 0 {
            for m in mean_ct.iter_mut() {
                *m /= n_good as f64;
            }
        }
        (mean_ct, n_bad)
    }

    /// §4.1's `computeAutoAIF`: scans `criteria.subvolume` (or the whole
    /// volume) for candidate blood voxels with `T1 > min_t1_blood_ms`,
    /// converts each to concentration, keeps those with a valid bolus
    /// arrival pattern (peak within `peak_time_min` of the injection image,
    /// no negative values afterwards), averages the top `select_pct` by
    /// peak concentration, and installs the result as `self.aif`'s baseline.
    /// Returns the labelled candidate map alongside the installed curve.
    pub fn compute_auto_aif(&mut self, criteria: &AutoAifCriteria) -> Result<Image3D, Error> {
        let dims = self.dims.ok_or(Error::MissingMetadata {
            context: "VolumeAnalysis::compute_auto_aif",
            field: "reference dimensions (add at least one dynamic image first)",
        })?;
        if self.t1_map.is_none() {
            return Err(Error::MissingMetadata {
                context: "VolumeAnalysis::compute_auto_aif",
                field: "T1 map",
            });
        }

        let (xr, yr, zr) = criteria
            .subvolume
            .unwrap_or(([0, dims[0]], [0, dims[1]], [0, dims[2]]));

        let mut label_map = Image3D::new(dims, AifMapLabel::NotCandidate as i32 as f64);
        label_map.image_type = ImageType::AifVoxelMap;
        let mut candidates: Vec<(usize, f64, Vec<f64>)> = Vec::new();

        for z in zr[0]..zr[1].min(dims[2]) {
            for y in yr[0]..yr[1].min(dims[1]) {
                for x in xr[0]..xr[1].min(dims[0]) {
                    let idx = column_major([x, y, z], dims)?;
                    let t1 = self.t1_map.as_ref().unwrap().data()[idx];
                    if t1 <= criteria.min_t1_blood_ms {
                        continue;
                    }

                    let acq = self.acquisition_at(idx);
                    let signal: Vec<f64> =
                        self.dynamic_signals.iter().map(|img| img.data()[idx]).collect();
                    let mut voxel = DceVoxel::new(
                        signal,
                        acq.t10_ms,
                        acq.m0,
                        acq.b1,
                        self.injection_image,
                        self.dynamic_times_min.clone(),
                        acq.tr_ms,
                        acq.fa_deg,
                        self.use_m0_ratio,
                    );
                    voxel.compute_ct_from_signal();
                    if voxel.status() != VoxelStatus::Ok {
                        label_map.set_voxel_linear(idx, AifMapLabel::InvalidCt as i32 as f64)?;
                        continue;
                    }

                    let ct = voxel.ct();
                    let (peak_idx, peak_val) = ct
                        .iter()
                        .enumerate()
                        .fold((0usize, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
                    let bolus_time = self.dynamic_times_min[self.injection_image];
                    let peak_time = self.dynamic_times_min[peak_idx] - bolus_time;
                    let arrival_ok = peak_time >= 0.0 && peak_time <= criteria.peak_time_min;
                    let no_negative_after_arrival =
                        ct[self.injection_image..].iter().all(|&v| v >= -1.0e-6);

                    if peak_val <= 0.0 || !arrival_ok || !no_negative_after_arrival {
                        label_map.set_voxel_linear(idx, AifMapLabel::InvalidCt as i32 as f64)?;
                        continue;
                    }

                    label_map.set_voxel_linear(idx, AifMapLabel::Selected as i32 as f64)?;
                    candidates.push((idx, peak_val, ct.to_vec()));
                }
            }
        }

        let (_, kept) = self
            .aif
            .compute_auto_aif(&candidates, criteria.select_pct)
            .ok_or(Error::MissingMetadata {
                context: "VolumeAnalysis::compute_auto_aif",
                field: "no candidate blood voxels found in subvolume",
            })?;
        for idx in kept {
            label_map.set_voxel_linear(idx, AifMapLabel::Used as i32 as f64)?;
        }

        Ok(label_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn etm_signal_image(dims: [usize; 3], value: f64) -> Image3D {
        let mut image = Image3D::new(dims, value);
        image.metadata.tr_s = Some(0.004);
        image.metadata.flip_angle_deg = Some(15.0);
        image
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let mut va = VolumeAnalysis::new(vec![0.0, 1.0], Aif::new(vec![0.0, 1.0]));
        va.add_dynamic_image(etm_signal_image([2, 2, 1], 100.0)).unwrap();
        let err = va.add_dynamic_image(Image3D::new([3, 3, 1], 0.0));
        assert!(err.is_err());
    }

    #[test]
    fn mean_ct_skips_flagged_voxels() {
        let dims = [2, 1, 1];
        let times: Vec<f64> = vec![0.0, 1.0, 2.0];
        let mut va = VolumeAnalysis::new(times.clone(), Aif::new(times));
        for _ in 0..3 {
            va.add_dynamic_image(etm_signal_image(dims, 1000.0)).unwrap();
        }
        va.set_t1_map(Image3D::new(dims, 1000.0)).unwrap();
        va.set_m0_map(Image3D::new(dims, 1000.0)).unwrap();

        let selector = Image3D::new(dims, 1.0);
        let (mean_ct, n_bad) = va.compute_mean_ct(&selector, 1.0);
        assert_eq!(mean_ct.len(), 3);
        assert_eq!(n_bad, 0);
    }

    /// §8 scenario 4: 100 blood-pool voxels (T1 above threshold, peak C=1.0)
    /// among 9900 tissue voxels (T1 below threshold, peak C=0.5). Only the
    /// blood-pool voxels should become candidates, so the averaged curve's
    /// peak lands near 1.0 regardless of `select_pct`.
    #[test]
    fn auto_aif_reduction_matches_spec_scenario() {
        use std::f64::consts::PI;

        fn forward_signal(t1_ms: f64, m0: f64, fa_deg: f64, tr_ms: f64) -> f64 {
            let fa = fa_deg * PI / 180.0;
            let e = (-tr_ms / t1_ms).exp();
            m0 * fa.sin() * (1.0 - e) / (1.0 - fa.cos() * e)
        }

        fn signal_for_c(c: f64, t10_ms: f64, r1_const: f64, m0: f64, fa_deg: f64, tr_ms: f64) -> f64 {
            let r1 = 1.0 / t10_ms + r1_const * 1.0e-3 * c;
            forward_signal(1.0 / r1, m0, fa_deg, tr_ms)
        }

        let dims = [100usize, 100, 1];
        let n = dims[0] * dims[1] * dims[2];
        let times: Vec<f64> = (0..6).map(|i| i as f64 * 0.5).collect();
        let injection_image = 2usize;
        let tr_ms = 4.0;
        let fa_deg = 15.0;
        let r1_const = 3.4;
        let m0 = 2000.0;
        let t1_blood = 1500.0;
        let t1_tissue = 500.0;

        let mut aif = Aif::new(times.clone());
        aif.set_hct(0.0);
        let mut va = VolumeAnalysis::new(times.clone(), aif);
        va.set_injection_image(injection_image);

        let mut t1_map = Image3D::new(dims, t1_tissue);
        for v in 0..100 {
            t1_map.set_voxel_linear(v, t1_blood).unwrap();
        }
        va.set_t1_map(t1_map).unwrap();
        va.set_m0_map(Image3D::new(dims, m0)).unwrap();

        for k in 0..times.len() {
            let mut img = Image3D::new(dims, 0.0);
            img.metadata.tr_s = Some(tr_ms / 1000.0);
            img.metadata.flip_angle_deg = Some(fa_deg);
            for v in 0..n {
                let c = if k < injection_image {
                    0.0
                } else if v < 100 {
                    1.0
                } else {
                    0.5
                };
                let t10 = if v < 100 { t1_blood } else { t1_tissue };
                img.set_voxel_linear(v, signal_for_c(c, t10, r1_const, m0, fa_deg, tr_ms))
                    .unwrap();
            }
            va.add_dynamic_image(img).unwrap();
        }

        let criteria = AutoAifCriteria {
            subvolume: None,
            min_t1_blood_ms: 1000.0,
            peak_time_min: 1.0,
            select_pct: 0.05,
        };
        let label_map = va.compute_auto_aif(&criteria).unwrap();

        // Only the 100 blood-pool voxels pass the T1 threshold to become
        // candidates at all.
        let n_candidates = label_map
            .data()
            .iter()
            .filter(|&&v| v != AifMapLabel::NotCandidate as i32 as f64)
            .count();
        assert_eq!(n_candidates, 100);

        let peak = va
            .aif
            .sequence_to_save()
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        assert!(peak >= 0.95 && peak <= 1.05, "peak = {peak}");
    }

    fn simple_single_voxel_analysis() -> VolumeAnalysis {
        let dims = [1usize, 1, 1];
        let times: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        let mut va = VolumeAnalysis::new(times.clone(), Aif::new(times));
        va.set_injection_image(2);
        for k in 0..8 {
            let value = if k < 2 { 500.0 } else { 700.0 };
            va.add_dynamic_image(etm_signal_image(dims, value)).unwrap();
        }
        va.set_t1_map(Image3D::new(dims, 1000.0)).unwrap();
        va.set_m0_map(Image3D::new(dims, 1000.0)).unwrap();
        va
    }

    #[test]
    fn init_map_params_seed_the_fitted_voxel() {
        let mut va = simple_single_voxel_analysis();
        let mut seed = HashMap::new();
        seed.insert("Ktrans".to_string(), Image3D::new([1, 1, 1], 0.2));
        va.set_init_map_params(seed).unwrap();

        let config = ModelConfig { model_name: "Patlak".to_string(), ..Default::default() };
        va.fit_all(config).unwrap();

        assert!(va.param_map("Ktrans").is_some());
    }

    #[test]
    fn residual_gating_preserves_preloaded_params_when_new_fit_is_worse() {
        let mut va = simple_single_voxel_analysis();
        let mut seed = HashMap::new();
        seed.insert("Ktrans".to_string(), Image3D::new([1, 1, 1], 0.42));
        va.set_init_map_params(seed).unwrap();
        va.set_init_residuals(Image3D::new([1, 1, 1], -1.0)).unwrap();

        let config = ModelConfig { model_name: "Patlak".to_string(), ..Default::default() };
        va.fit_all(config).unwrap();

        // A baseline of -1.0 can never be beaten, so the preloaded value
        // must survive untouched.
        let ktrans = va.param_map("Ktrans").unwrap();
        assert_eq!(ktrans.data()[0], 0.42);
        assert_eq!(va.residuals_map().unwrap().data()[0], -1.0);
    }

    #[test]
    fn residual_window_restricts_the_objective_to_the_requested_range() {
        // A window that ends before the signal ever enhances (injection is
        // at index 2, enhancement starts at index 2) should fit a flat
        // baseline with near-zero residual, unlike fitting the full series.
        let mut va = simple_single_voxel_analysis();
        let config = ModelConfig {
            model_name: "Patlak".to_string(),
            residual_window: Some((0, 2)),
            ..Default::default()
        };
        va.fit_all(config).unwrap();

        let windowed_sse = va.residuals_map().unwrap().data()[0];
        assert!(windowed_sse.abs() < 1e-6, "windowed_sse = {windowed_sse}");
    }
}
