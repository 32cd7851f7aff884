//! Parameter-map output directory layout (§6): one float32 image per free
//! model parameter, IAUC maps, the enhancement mask, residuals, the
//! int32 error-code image, and per-map summary text/CSV statistics.

use std::path::Path;

use madym_core::error_tracker::ErrorTracker;
use madym_core::image3d::Image3D;
use madym_core::stats::{summary_stats, ParamSummaryStats};
use madym_core::volume_analysis::VolumeAnalysis;

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::nifti::write_nifti;

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| Error::Io { path: dir.display().to_string(), source })
}

/// Writes one parameter map as `<dir>/<name>.nii`, float32.
fn write_map(dir: &Path, name: &str, image: &Image3D) -> Result<()> {
    let path = dir.join(format!("{name}.nii"));
    write_nifti(&path, image, Datatype::F32, false)
}

/// Writes the int32 `error_codes` image.
fn write_error_codes(dir: &Path, tracker: &ErrorTracker) -> Result<()> {
    let mut image = Image3D::new(tracker.dims(), 0.0);
    for i in 0..tracker.n_voxels() {
        image.data_mut()[i] = tracker.mask(i) as f64;
    }
    let path = dir.join("error_codes.nii");
    write_nifti(&path, &image, Datatype::I32, false)
}

/// `<name>_summary.txt`: a human-readable one-statistic-per-line report.
fn write_summary_txt(dir: &Path, name: &str, stats: &ParamSummaryStats) -> Result<()> {
    let text = format!(
        "mean\t{}\nstddev\t{}\nmedian\t{}\nQ1\t{}\nQ3\t{}\nIQR\t{}\nvalid\t{}\ninvalid\t{}\n",
        stats.mean, stats.stddev, stats.median, stats.lower_q, stats.upper_q, stats.iqr, stats.n_valid, stats.n_invalid,
    );
    let path = dir.join(format!("{name}_summary.txt"));
    std::fs::write(&path, text).map_err(|source| Error::Io { path: path.display().to_string(), source })
}

/// `<name>_summary_stats.csv`: the same statistics as one CSV row.
fn write_summary_csv(dir: &Path, name: &str, stats: &ParamSummaryStats) -> Result<()> {
    let text = format!(
        "parameter,mean,stddev,median,q1,q3,iqr,n_valid,n_invalid\n{},{},{},{},{},{},{},{},{}\n",
        name, stats.mean, stats.stddev, stats.median, stats.lower_q, stats.upper_q, stats.iqr, stats.n_valid, stats.n_invalid,
    );
    let path = dir.join(format!("{name}_summary_stats.csv"));
    std::fs::write(&path, text).map_err(|source| Error::Io { path: path.display().to_string(), source })
}

fn write_map_with_summary(dir: &Path, name: &str, image: &Image3D, tracker: &ErrorTracker) -> Result<()> {
    write_map(dir, name, image)?;
    let stats = summary_stats(image, tracker, 1.0, false);
    write_summary_txt(dir, name, &stats)?;
    write_summary_csv(dir, name, &stats)?;
    Ok(())
}

/// Writes every output of a finished [`VolumeAnalysis`] run under
/// `output_dir`, following the §6 directory layout: one image per free
/// parameter plus its summary files, `IAUC<T>`/`IAUC_peak`, `enhVox`,
/// `residuals` and `error_codes`.
pub fn write_volume_outputs(output_dir: &Path, analysis: &VolumeAnalysis) -> Result<()> {
    ensure_dir(output_dir)?;
    let tracker = analysis.error_tracker().ok_or_else(|| Error::FileFormatBad {
        path: output_dir.display().to_string(),
        detail: "analysis has no error tracker (no dynamic images were ever added)".to_string(),
    })?;

    for (name, image) in analysis.param_maps() {
        write_map_with_summary(output_dir, name, image, tracker)?;
    }
    for (key, image) in analysis.iauc_maps() {
        write_map(output_dir, key, image)?;
    }
    if let Some(residuals) = analysis.residuals_map() {
        write_map(output_dir, "residuals", residuals)?;
    }
    if let Some(enh) = analysis.enhancing_map() {
        write_map(output_dir, "enhVox", enh)?;
    }
    write_error_codes(output_dir, tracker)?;
    Ok(())
}

/// Writes a standalone T1-mapping-stage triple (`T1`, `M0`, `efficiency`,
/// `B1`), used when the T1 stage ran ahead of / independently from DCE
/// fitting. Any map that is `None` is skipped.
pub fn write_t1_outputs(
    output_dir: &Path,
    t1: Option<&Image3D>,
    m0: Option<&Image3D>,
    efficiency: Option<&Image3D>,
    b1: Option<&Image3D>,
    tracker: &ErrorTracker,
) -> Result<()> {
    ensure_dir(output_dir)?;
    if let Some(image) = t1 {
        write_map_with_summary(output_dir, "T1", image, tracker)?;
    }
    if let Some(image) = m0 {
        write_map_with_summary(output_dir, "M0", image, tracker)?;
    }
    if let Some(image) = efficiency {
        write_map_with_summary(output_dir, "efficiency", image, tracker)?;
    }
    if let Some(image) = b1 {
        write_map_with_summary(output_dir, "B1", image, tracker)?;
    }
    write_error_codes(output_dir, tracker)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use madym_core::aif::Aif;

    #[test]
    fn writes_error_codes_and_param_maps_for_a_minimal_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let times: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let mut analysis = VolumeAnalysis::new(times.clone(), Aif::new(times));
        for _ in 0..10 {
            let mut image = Image3D::new([2, 2, 1], 500.0);
            image.metadata.tr_s = Some(0.004);
            image.metadata.flip_angle_deg = Some(15.0);
            analysis.add_dynamic_image(image).unwrap();
        }
        analysis.set_t1_map(Image3D::new([2, 2, 1], 1000.0)).unwrap();
        analysis.set_m0_map(Image3D::new([2, 2, 1], 1000.0)).unwrap();

        let config = madym_core::volume_analysis::ModelConfig {
            model_name: "Patlak".to_string(),
            ..Default::default()
        };
        analysis.fit_all(config).unwrap();

        write_volume_outputs(dir.path(), &analysis).unwrap();
        assert!(dir.path().join("error_codes.nii").exists());
        assert!(dir.path().join("Ktrans.nii").exists());
        assert!(dir.path().join("Ktrans_summary.txt").exists());
        assert!(dir.path().join("Ktrans_summary_stats.csv").exists());
    }
}
