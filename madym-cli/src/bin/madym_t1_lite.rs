//! Voxel-wise T1/M0 relaxometry mapping.
//!
//! Mirrors the original `madym_T1_lite` tool: given a series of variable
//! flip-angle or inversion-recovery input images, fits T1 (and M0, and
//! optionally the inversion efficiency) at every voxel.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use madym_cli::config::Config;
use madym_cli::pipeline::{run_t1, T1Method, T1RunOptions};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Fit T1/M0 relaxometry over a VFA or IR input series.", long_about = "")]
struct Cli {
    /// Input images (variable flip-angle or inversion-recovery series).
    #[arg(long, required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Fitting method: "VFA", "VFA_B1", "IR" or "IR_EFF".
    #[arg(long = "T1-method")]
    t1_method: Option<String>,

    /// Optional per-voxel B1 correction map (used by "VFA_B1").
    #[arg(long)]
    b1_map: Option<PathBuf>,

    /// Optional TOML config file; CLI flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for the fitted T1/M0/efficiency maps.
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

    let method_str = cli.t1_method.or(file_config.t1.method).unwrap_or_else(|| "VFA".to_string());
    let method = T1Method::parse(&method_str)?;

    let opts = T1RunOptions {
        inputs: cli.inputs,
        method,
        b1_map: cli.b1_map,
        output_dir: cli.output,
    };

    run_t1(&opts)?;
    Ok(())
}
