//! Orchestration shared by the three `madym_*_lite` binaries: load inputs
//! through `madym-io`, assemble a `madym-core` analysis, run it, write the
//! outputs back out. Each `run_*` function is the body of its binary's
//! `main`, kept here so it can be exercised by a test without a process
//! boundary.

use std::path::{Path, PathBuf};

use tracing::info;

use madym_core::aif::Aif;
use madym_core::dwi::{Adc, DwiErrorCode, DwiFitter, Ivim};
use madym_core::error_tracker::{ErrorCode, ErrorTracker};
use madym_core::image3d::Image3D;
use madym_core::t1::{Ir, T1Fitter, Vfa};
use madym_core::volume_analysis::{ModelConfig, VolumeAnalysis};
use madym_optim::OptimiserKind;
use madym_io::nifti::write_nifti;
use madym_io::param_maps::write_volume_outputs;
use madym_io::{xtr, Datatype};

use crate::error::{Error, Result};

/// Parses the `--opt-type`/`opt_type` value (`"BLEIC"` or `"NS"`, case
/// insensitive).
pub fn parse_opt_type(s: &str) -> Result<OptimiserKind> {
    match s.to_ascii_uppercase().as_str() {
        "BLEIC" => Ok(OptimiserKind::Bleic),
        "NS" => Ok(OptimiserKind::Ns),
        other => Err(Error::UnknownOptType(other.to_string())),
    }
}

/// Loads a volume, dispatching on extension: `.hdr`/`.img` is read as
/// Analyze 7.5, everything else (`.nii`, `.nii.gz`) as NIFTI-1.
pub fn load_volume(path: &Path) -> Result<Image3D> {
    let is_analyze = matches!(path.extension().and_then(|e| e.to_str()), Some("hdr") | Some("img"));
    let image = if is_analyze {
        madym_io::analyze::read_analyze(path)?
    } else {
        madym_io::nifti::read_nifti(path, true)?
    };
    Ok(image)
}

/// The XTR sidecar convention this CLI uses: `<image>.xtr` next to the image
/// file, e.g. `dynamic_001.nii.xtr`.
pub fn xtr_path_for(image_path: &Path) -> PathBuf {
    let mut s = image_path.as_os_str().to_owned();
    s.push(".xtr");
    PathBuf::from(s)
}

/// Loads a volume plus, if a sidecar exists next to it, its XTR metadata.
fn load_volume_with_xtr(path: &Path) -> Result<Image3D> {
    let mut image = load_volume(path)?;
    let xtr_path = xtr_path_for(path);
    if xtr_path.exists() {
        let (meta, image_type) = xtr::read_xtr(&xtr_path)?;
        image.metadata = meta;
        image.image_type = image_type;
    }
    Ok(image)
}

/// Fully-resolved DCE-fitting run: every CLI flag and config-file field
/// merged down to its final value, plus the input file paths.
pub struct DceRunOptions {
    pub dynamic_images: Vec<PathBuf>,
    pub t1_map: PathBuf,
    pub m0_map: PathBuf,
    pub b1_map: Option<PathBuf>,
    pub roi: Option<PathBuf>,
    pub aif_file: Option<PathBuf>,
    pub pif_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub model: String,
    pub dose: f64,
    pub hct: f64,
    pub injection_image: usize,
    pub first_image: Option<usize>,
    pub last_image: Option<usize>,
    pub iauc_times_min: Vec<f64>,
    pub fixed_params: Vec<usize>,
    pub fixed_values: Vec<Option<f64>>,
    pub relative_limit_params: Vec<usize>,
    pub relative_limit_values: Vec<f64>,
    pub init_params: Option<Vec<f64>>,
    pub max_iterations: usize,
    pub opt_type: OptimiserKind,
    pub use_m0_ratio: bool,
}

/// Reads every dynamic image (plus its XTR sidecar, for the acquisition
/// timestamp) and returns them in the order given, alongside the dynamic
/// time grid in minutes.
fn load_dynamic_series(paths: &[PathBuf]) -> Result<(Vec<Image3D>, Vec<f64>)> {
    if paths.is_empty() {
        return Err(Error::NoDynamicImages);
    }
    let mut images = Vec::with_capacity(paths.len());
    let mut times_min = Vec::with_capacity(paths.len());
    for path in paths {
        let image = load_volume_with_xtr(path)?;
        times_min.push(image.metadata.timestamp.unwrap_or(times_min.len() as f64));
        images.push(image);
    }
    Ok((images, times_min))
}

fn build_model_config(opts: &DceRunOptions) -> Result<ModelConfig> {
    if opts.fixed_params.len() != opts.fixed_values.len() {
        return Err(Error::FixedParamsLengthMismatch {
            n_params: opts.fixed_params.len(),
            n_values: opts.fixed_values.len(),
        });
    }
    if opts.relative_limit_params.len() != opts.relative_limit_values.len() {
        return Err(Error::RelativeBoundsLengthMismatch {
            n_params: opts.relative_limit_params.len(),
            n_values: opts.relative_limit_values.len(),
        });
    }
    let fixed_params: Vec<(usize, Option<f64>)> = opts
        .fixed_params
        .iter()
        .copied()
        .zip(opts.fixed_values.iter().copied())
        .collect();
    let relative_bounds: Vec<(usize, f64)> = opts
        .relative_limit_params
        .iter()
        .copied()
        .zip(opts.relative_limit_values.iter().copied())
        .collect();
    let residual_window = opts.first_image.map(|first| {
        let last = opts.last_image.map(|l| l + 1).unwrap_or(usize::MAX);
        (first, last)
    });
    Ok(ModelConfig {
        model_name: opts.model.clone(),
        fixed_params,
        relative_bounds,
        repeat_param: None,
        optimiser: opts.opt_type,
        max_iterations: opts.max_iterations,
        residual_window,
    })
}

/// Builds the AIF from either a loaded baseline file or the Parker
/// population form, matching the original's `AIF_FILE` vs `AIF_POP`
/// selection. [`Aif::new`] already defaults to [`AifKind::Population`], so
/// only the file-backed case needs an explicit switch.
fn build_aif(opts: &DceRunOptions, times_min: &[f64]) -> Result<Aif> {
    let mut aif = Aif::new(times_min.to_vec());
    aif.set_dose(opts.dose);
    aif.set_hct(opts.hct);
    if let Some(path) = &opts.aif_file {
        let (_, values) = madym_io::aif_file::read_pairs(path, times_min.len())?;
        aif.set_baseline_aif(values);
    }
    if let Some(path) = &opts.pif_file {
        let (_, values) = madym_io::aif_file::read_pairs(path, times_min.len())?;
        aif.set_baseline_pif(values);
    }
    Ok(aif)
}

/// Runs a full DCE-fitting analysis and writes its outputs. This is the body
/// of `madym_DCE_lite`.
pub fn run_dce(opts: &DceRunOptions) -> Result<()> {
    let (images, times_min) = load_dynamic_series(&opts.dynamic_images)?;

    let aif = build_aif(opts, &times_min)?;
    let mut analysis = VolumeAnalysis::new(times_min, aif);
    analysis.set_injection_image(opts.injection_image);
    analysis.set_use_m0_ratio(opts.use_m0_ratio);
    analysis.set_iauc_times_min(opts.iauc_times_min.clone());

    for image in images {
        analysis.add_dynamic_image(image)?;
    }
    analysis.set_t1_map(load_volume(&opts.t1_map)?)?;
    analysis.set_m0_map(load_volume(&opts.m0_map)?)?;
    if let Some(path) = &opts.b1_map {
        analysis.set_b1_map(load_volume(path)?)?;
    }
    if let Some(path) = &opts.roi {
        analysis.set_roi(load_volume(path)?)?;
    }

    let config = build_model_config(opts)?;
    let model = madym_core::dce::model_by_name(&opts.model)?;
    let param_names = model.params().names();
    if let Some(init) = &opts.init_params {
        if init.len() != param_names.len() {
            return Err(Error::InitParamsLengthMismatch {
                model: opts.model.clone(),
                expected: param_names.len(),
                actual: init.len(),
            });
        }
        let dims = analysis.dims().ok_or(madym_core::error::Error::MissingMetadata {
            context: "run_dce",
            field: "reference dimensions (add at least one dynamic image first)",
        })?;
        let maps = param_names
            .iter()
            .zip(init.iter())
            .map(|(&name, &value)| (name.to_string(), Image3D::new(dims, value)))
            .collect();
        analysis.set_init_map_params(maps)?;
    }

    info!("fitting model '{}' over the ROI", opts.model);
    analysis.fit_all(config)?;

    write_volume_outputs(&opts.output_dir, &analysis)?;
    Ok(())
}

/// Resolved T1-mapping run.
pub struct T1RunOptions {
    pub inputs: Vec<PathBuf>,
    pub method: T1Method,
    pub b1_map: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum T1Method {
    Vfa,
    VfaB1,
    IrFixedEfficiency,
    IrFitEfficiency,
}

impl T1Method {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VFA" => Ok(T1Method::Vfa),
            "VFA_B1" => Ok(T1Method::VfaB1),
            "IR" => Ok(T1Method::IrFixedEfficiency),
            "IR_EFF" => Ok(T1Method::IrFitEfficiency),
            other => Err(Error::UnknownT1Method(other.to_string())),
        }
    }
}

/// Runs variable flip-angle or inversion-recovery T1/M0 mapping over a
/// series of input images, one voxel at a time. This is the body of
/// `madym_T1_lite`.
pub fn run_t1(opts: &T1RunOptions) -> Result<()> {
    if opts.inputs.is_empty() {
        return Err(Error::NoDynamicImages);
    }
    let images: Vec<Image3D> = opts
        .inputs
        .iter()
        .map(|p| load_volume_with_xtr(p))
        .collect::<Result<Vec<_>>>()?;
    let dims = images[0].dims();
    let n_voxels = images[0].n_voxels();
    let b1_map = opts.b1_map.as_deref().map(load_volume).transpose()?;

    let tr_ms = images[0].metadata.tr_s.unwrap_or(0.0) * 1000.0;

    let mut t1 = Image3D::new(dims, 0.0);
    let mut m0 = Image3D::new(dims, 0.0);
    let mut efficiency = Image3D::new(dims, 1.0);
    let mut tracker = ErrorTracker::new(dims);

    for idx in 0..n_voxels {
        let signals: Vec<f64> = images.iter().map(|img| img.data()[idx]).collect();
        let result = match opts.method {
            T1Method::Vfa => {
                let flip_angles_rad: Vec<f64> = images
                    .iter()
                    .map(|img| img.metadata.flip_angle_deg.unwrap_or(0.0).to_radians())
                    .collect();
                let mut fitter = Vfa::new(flip_angles_rad, tr_ms);
                fitter.set_inputs(&signals)?;
                fitter.fit_t1()
            }
            T1Method::VfaB1 => {
                let flip_angles_rad: Vec<f64> = images
                    .iter()
                    .map(|img| img.metadata.flip_angle_deg.unwrap_or(0.0).to_radians())
                    .collect();
                let mut fitter = Vfa::with_b1_correction(flip_angles_rad, tr_ms);
                let b1 = b1_map.as_ref().map(|m| m.data()[idx]).unwrap_or(1.0);
                let mut inputs = signals;
                inputs.push(b1);
                fitter.set_inputs(&inputs)?;
                fitter.fit_t1()
            }
            T1Method::IrFixedEfficiency | T1Method::IrFitEfficiency => {
                let tis_ms: Vec<f64> = images.iter().map(|img| img.metadata.ti_s.unwrap_or(0.0) * 1000.0).collect();
                let fit_efficiency = opts.method == T1Method::IrFitEfficiency;
                let mut fitter = Ir::new(tis_ms, tr_ms, fit_efficiency);
                fitter.set_inputs(&signals)?;
                fitter.fit_t1()
            }
        };

        let _ = t1.set_voxel_linear(idx, result.t1_ms);
        let _ = m0.set_voxel_linear(idx, result.m0);
        let _ = efficiency.set_voxel_linear(idx, result.ew);
        tracker.update_voxel(idx, result.error);
    }

    madym_io::param_maps::write_t1_outputs(&opts.output_dir, Some(&t1), Some(&m0), Some(&efficiency), b1_map.as_ref(), &tracker)?;
    Ok(())
}

/// Resolved DWI-fitting run.
pub struct DwiRunOptions {
    pub inputs: Vec<PathBuf>,
    pub bvalues: Vec<f64>,
    pub model: DwiModel,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwiModel {
    Adc,
    IvimSimple,
    IvimFull,
}

impl DwiModel {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ADC" => Ok(DwiModel::Adc),
            "IVIM" => Ok(DwiModel::IvimSimple),
            "IVIM_FULL" => Ok(DwiModel::IvimFull),
            other => Err(Error::UnknownDwiModel(other.to_string())),
        }
    }
}

/// Runs ADC or IVIM diffusion fitting over a series of b-value images. This
/// is the body of `madym_DWI_lite`.
pub fn run_dwi(opts: &DwiRunOptions) -> Result<()> {
    if opts.inputs.is_empty() {
        return Err(Error::NoDynamicImages);
    }
    let images: Vec<Image3D> = opts.inputs.iter().map(|p| load_volume(p)).collect::<Result<Vec<_>>>()?;
    let dims = images[0].dims();
    let n_voxels = images[0].n_voxels();

    let param_names: &[&str] = match opts.model {
        DwiModel::Adc => &["S0", "ADC"],
        DwiModel::IvimSimple => &["S0", "D", "f"],
        DwiModel::IvimFull => &["S0", "D", "Dstar", "f"],
    };
    let mut param_maps: Vec<Image3D> = param_names.iter().map(|_| Image3D::new(dims, 0.0)).collect();
    let mut tracker = ErrorTracker::new(dims);

    for idx in 0..n_voxels {
        let signals: Vec<f64> = images.iter().map(|img| img.data()[idx]).collect();
        let (params, error) = match opts.model {
            DwiModel::Adc => {
                let mut fitter = Adc::new(false);
                fitter.set_inputs(&opts.bvalues, &signals)?;
                let r = fitter.fit();
                (r.params, r.error)
            }
            DwiModel::IvimSimple => {
                let mut fitter = Ivim::new(false, vec![200.0, 400.0]);
                fitter.set_inputs(&opts.bvalues, &signals)?;
                let r = fitter.fit();
                (r.params, r.error)
            }
            DwiModel::IvimFull => {
                let mut fitter = Ivim::new(true, vec![200.0, 400.0]);
                fitter.set_inputs(&opts.bvalues, &signals)?;
                let r = fitter.fit();
                (r.params, r.error)
            }
        };
        for (p, map) in param_maps.iter_mut().enumerate() {
            let _ = map.set_voxel_linear(idx, params.get(p).copied().unwrap_or(0.0));
        }
        let code = match error {
            DwiErrorCode::Ok => ErrorCode::Ok,
            DwiErrorCode::InputZero => ErrorCode::DceInvalidInput,
            DwiErrorCode::FitFail => ErrorCode::DceFitFail,
            DwiErrorCode::MaxIter => ErrorCode::T1MaxIter,
        };
        tracker.update_voxel(idx, code);
    }

    std::fs::create_dir_all(&opts.output_dir).map_err(|e| Error::Io(madym_io::Error::Io {
        path: opts.output_dir.display().to_string(),
        source: e,
    }))?;
    for (name, map) in param_names.iter().zip(param_maps.iter()) {
        write_nifti(&opts.output_dir.join(format!("{name}.nii")), map, Datatype::F32, false)?;
    }
    let mut error_image = Image3D::new(dims, 0.0);
    for i in 0..n_voxels {
        error_image.data_mut()[i] = tracker.mask(i) as f64;
    }
    write_nifti(&opts.output_dir.join("error_codes.nii"), &error_image, Datatype::I32, false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use madym_core::image3d::Metadata;

    fn write_dyn_image(dir: &std::path::Path, index: usize, timestamp: f64, value: f64) -> PathBuf {
        let mut image = Image3D::new([2, 2, 1], value);
        image.metadata.tr_s = Some(0.005);
        image.metadata.flip_angle_deg = Some(15.0);
        let path = dir.join(format!("dynamic_{index:03}.nii"));
        write_nifti(&path, &image, Datatype::F32, false).unwrap();
        let mut meta = Metadata::default();
        meta.timestamp = Some(timestamp);
        meta.flip_angle_deg = Some(15.0);
        meta.tr_s = Some(0.005);
        xtr::write_xtr(&xtr_path_for(&path), &meta, madym_core::image3d::ImageType::T1Dynamic).unwrap();
        path
    }

    #[test]
    fn run_dce_writes_patlak_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let dyn_images: Vec<PathBuf> = (0..8).map(|i| write_dyn_image(dir.path(), i, i as f64 * 0.5, 500.0)).collect();

        let t1 = Image3D::new([2, 2, 1], 1000.0);
        let m0 = Image3D::new([2, 2, 1], 1000.0);
        let t1_path = dir.path().join("t1.nii");
        let m0_path = dir.path().join("m0.nii");
        write_nifti(&t1_path, &t1, Datatype::F32, false).unwrap();
        write_nifti(&m0_path, &m0, Datatype::F32, false).unwrap();

        let output_dir = dir.path().join("out");
        let opts = DceRunOptions {
            dynamic_images: dyn_images,
            t1_map: t1_path,
            m0_map: m0_path,
            b1_map: None,
            roi: None,
            aif_file: None,
            pif_file: None,
            output_dir: output_dir.clone(),
            model: "Patlak".to_string(),
            dose: 0.1,
            hct: 0.42,
            injection_image: 2,
            first_image: None,
            last_image: None,
            iauc_times_min: vec![1.0],
            fixed_params: Vec::new(),
            fixed_values: Vec::new(),
            relative_limit_params: Vec::new(),
            relative_limit_values: Vec::new(),
            init_params: None,
            max_iterations: 100,
            opt_type: OptimiserKind::Bleic,
            use_m0_ratio: false,
        };

        run_dce(&opts).unwrap();
        assert!(output_dir.join("Ktrans.nii").exists());
        assert!(output_dir.join("error_codes.nii").exists());
    }

    #[test]
    fn mismatched_fixed_params_lengths_are_rejected() {
        let opts = DceRunOptions {
            dynamic_images: Vec::new(),
            t1_map: PathBuf::new(),
            m0_map: PathBuf::new(),
            b1_map: None,
            roi: None,
            aif_file: None,
            pif_file: None,
            output_dir: PathBuf::new(),
            model: "Patlak".to_string(),
            dose: 0.1,
            hct: 0.42,
            injection_image: 0,
            first_image: None,
            last_image: None,
            iauc_times_min: Vec::new(),
            fixed_params: vec![0, 1],
            fixed_values: vec![Some(1.0)],
            relative_limit_params: Vec::new(),
            relative_limit_values: Vec::new(),
            init_params: None,
            max_iterations: 100,
            opt_type: OptimiserKind::Bleic,
            use_m0_ratio: false,
        };
        let err = build_model_config(&opts).unwrap_err();
        assert!(matches!(err, Error::FixedParamsLengthMismatch { .. }));
    }

    #[test]
    fn opt_type_rejects_unknown_value() {
        assert!(parse_opt_type("bogus").is_err());
        assert!(matches!(parse_opt_type("ns").unwrap(), OptimiserKind::Ns));
    }
}
