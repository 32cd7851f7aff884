//! Voxel-wise diffusion-weighted model fitting.
//!
//! Mirrors the original `madym_DWI_lite` tool: given a series of
//! diffusion-weighted images and their b-values, fits ADC or IVIM at every
//! voxel.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use madym_cli::pipeline::{run_dwi, DwiModel, DwiRunOptions};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Fit ADC or IVIM over a diffusion-weighted series.", long_about = "")]
struct Cli {
    /// Diffusion-weighted input images, one per b-value.
    #[arg(long, required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// b-values (s/mm^2), one per input image, in the same order.
    #[arg(long, required = true, value_delimiter = ',')]
    bvalues: Vec<f64>,

    /// Model: "ADC" (mono-exponential), "IVIM" (3-parameter) or "IVIM_FULL" (4-parameter).
    #[arg(long, default_value = "ADC")]
    model: String,

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

    let model = DwiModel::parse(&cli.model)?;

    let opts = DwiRunOptions {
        inputs: cli.inputs,
        bvalues: cli.bvalues,
        model,
        output_dir: cli.output,
    };

    run_dwi(&opts)?;
    Ok(())
}
