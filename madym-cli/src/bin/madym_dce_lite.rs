//! Voxel-wise tracer-kinetic model fitting over a DCE-MRI dynamic series.
//!
//! Mirrors the original `madym_DCE_lite` tool: given a dynamic series, a T1
//! map (and M0 map), fits the chosen tracer-kinetic model at every ROI
//! voxel and writes one parameter map per free parameter plus IAUC,
//! enhancement and error-code maps.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use madym_cli::config::Config;
use madym_cli::pipeline::{run_dce, DceRunOptions};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Fit a tracer-kinetic model over a DCE-MRI dynamic series.", long_about = "")]
struct Cli {
    /// Dynamic series images, in acquisition order.
    #[arg(long = "dyn", required = true, num_args = 1..)]
    dyn_images: Vec<PathBuf>,

    /// Pre-fitted baseline T1 map.
    #[arg(long)]
    t1_map: PathBuf,

    /// Pre-fitted baseline M0 map.
    #[arg(long)]
    m0_map: PathBuf,

    /// Optional per-voxel B1 correction map.
    #[arg(long)]
    b1_map: Option<PathBuf>,

    /// Optional ROI mask; voxels outside it are never fitted.
    #[arg(long)]
    roi: Option<PathBuf>,

    /// Optional TOML config file; CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracer-kinetic model name (Patlak, ETM, DIETM, 2CXM, DIBEM, AUEM, DISCM). Defaults to "ETM" if also unset in the config file.
    #[arg(long)]
    model: Option<String>,

    /// Arterial input function source file; population (Parker) form used if omitted.
    #[arg(long)]
    aif_file: Option<PathBuf>,

    /// Portal-venous input function source file, for dual-input models.
    #[arg(long)]
    pif_file: Option<PathBuf>,

    /// Contrast-agent dose, mmol/kg.
    #[arg(long)]
    dose: Option<f64>,

    /// Haematocrit.
    #[arg(long)]
    hct: Option<f64>,

    /// Index of the first post-injection dynamic image.
    #[arg(long)]
    injection_image: Option<usize>,

    /// First dynamic image index to include in the fit (0-based, inclusive).
    #[arg(long)]
    first_image: Option<usize>,

    /// Last dynamic image index to include in the fit (0-based, inclusive).
    #[arg(long)]
    last_image: Option<usize>,

    /// IAUC integration windows, minutes, comma-separated (e.g. 1,2,5).
    #[arg(long, value_delimiter = ',')]
    iauc_times: Vec<f64>,

    /// Indices of model parameters to hold fixed, comma-separated.
    #[arg(long, value_delimiter = ',')]
    fixed_params: Vec<usize>,

    /// Values to fix the corresponding `--fixed-params` entries to.
    #[arg(long, value_delimiter = ',')]
    fixed_values: Vec<f64>,

    /// Indices of model parameters to bound relative to their seed value.
    #[arg(long, value_delimiter = ',')]
    relative_limit_params: Vec<usize>,

    /// Relative bound widths for the corresponding `--relative-limit-params`.
    #[arg(long, value_delimiter = ',')]
    relative_limit_values: Vec<f64>,

    /// Initial parameter values, comma-separated, one per model parameter.
    #[arg(long, value_delimiter = ',')]
    init_params: Vec<f64>,

    /// Maximum optimiser iterations per voxel.
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Optimiser backend: "BLEIC" (default, box-constrained quasi-Newton) or "NS" (Nelder-Mead).
    #[arg(long)]
    opt_type: Option<String>,

    /// Use the ratio-to-M0 signal-to-concentration conversion instead of the default.
    #[arg(long, default_value_t = false)]
    m0_ratio: bool,

    /// Output directory for the fitted parameter maps.
    #[arg(long)]
    output: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    madym_cli::init_logging(cli.verbose);

    let file_config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let dce = file_config.dce;

    let model = cli.model.or(dce.model).unwrap_or_else(|| "ETM".to_string());
    let dose = cli.dose.or(dce.dose).unwrap_or(0.1);
    let hct = cli.hct.or(dce.hct).unwrap_or(0.42);
    let injection_image = cli.injection_image.or(dce.injection_image).unwrap_or(0);
    let first_image = cli.first_image.or(dce.first_image);
    let last_image = cli.last_image.or(dce.last_image);
    let iauc_times_min = if !cli.iauc_times.is_empty() { cli.iauc_times } else { dce.iauc_times.unwrap_or_default() };
    let fixed_params = if !cli.fixed_params.is_empty() { cli.fixed_params } else { dce.fixed_params.unwrap_or_default() };
    let fixed_values: Vec<Option<f64>> = if !cli.fixed_values.is_empty() {
        cli.fixed_values.into_iter().map(Some).collect()
    } else {
        dce.fixed_values.unwrap_or_default().into_iter().map(Some).collect()
    };
    let relative_limit_params =
        if !cli.relative_limit_params.is_empty() { cli.relative_limit_params } else { dce.relative_limit_params.unwrap_or_default() };
    let relative_limit_values =
        if !cli.relative_limit_values.is_empty() { cli.relative_limit_values } else { dce.relative_limit_values.unwrap_or_default() };
    let init_params = if !cli.init_params.is_empty() { Some(cli.init_params) } else { dce.init_params };
    let max_iterations = cli.max_iterations.or(dce.max_iterations).unwrap_or(500);
    let opt_type_str = cli.opt_type.or(dce.opt_type).unwrap_or_else(|| "BLEIC".to_string());
    let opt_type = madym_cli::pipeline::parse_opt_type(&opt_type_str)?;

    let opts = DceRunOptions {
        dynamic_images: cli.dyn_images,
        t1_map: cli.t1_map,
        m0_map: cli.m0_map,
        b1_map: cli.b1_map,
        roi: cli.roi,
        aif_file: cli.aif_file,
        pif_file: cli.pif_file,
        output_dir: cli.output,
        model,
        dose,
        hct,
        injection_image,
        first_image,
        last_image,
        iauc_times_min,
        fixed_params,
        fixed_values,
        relative_limit_params,
        relative_limit_values,
        init_params,
        max_iterations,
        opt_type,
        use_m0_ratio: cli.m0_ratio,
    };

    run_dce(&opts)?;
    Ok(())
}
