//! Per-parameter-map summary statistics (§4.7): mean, stddev, median,
//! quartiles and IQR over valid voxels, plus valid/invalid counts.

use crate::error_tracker::ErrorTracker;
use crate::image3d::Image3D;

/// Summary statistics for one output parameter map over its valid voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSummaryStats {
    pub n_valid: usize,
    pub n_invalid: usize,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    pub lower_q: f64,
    pub upper_q: f64,
    pub iqr: f64,
}

impl ParamSummaryStats {
    fn empty(n_invalid: usize) -> Self {
        Self { n_valid: 0, n_invalid, mean: 0.0, stddev: 0.0, median: 0.0, lower_q: 0.0, upper_q: 0.0, iqr: 0.0 }
    }
}

/// Nearest-rank-with-interpolation percentile (Wikipedia "Method 4"), on an
/// already-sorted `sorted`.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if pct == 0.0 {
        return sorted[0];
    }
    if pct == 100.0 {
        return *sorted.last().unwrap();
    }
    let n1 = sorted.len() as f64 + 1.0;
    let pn1 = n1 * pct / 100.0;
    let k = pn1.floor();
    if k == 0.0 {
        return sorted[0];
    }
    if k as usize == sorted.len() {
        return *sorted.last().unwrap();
    }
    let alpha = pn1 - k;
    let k = k as usize;
    sorted[k - 1] + alpha * (sorted[k] - sorted[k - 1])
}

/// Computes summary statistics over every voxel the `tracker` marks OK
/// (voxels with any error bit set are excluded as invalid), optionally
/// scaling or inverting each value first (matching the original's
/// `makeStats(img, name, scale, invert)` signature).
pub fn summary_stats(image: &Image3D, tracker: &ErrorTracker, scale: f64, invert: bool) -> ParamSummaryStats {
    let mut n_invalid = 0usize;
    let mut values = Vec::new();
    let mut sum = 0.0;
    let mut sumsq = 0.0;

    for i in 0..image.n_voxels() {
        let mut v = scale * image.data()[i];
        if !tracker.is_ok(i) || v.is_nan() {
            n_invalid += 1;
            continue;
        }
        if invert {
            if v <= 0.0 {
                n_invalid += 1;
                continue;
            }
            v = 1.0 / v;
        }
        sum += v;
        sumsq += v * v;
        values.push(v);
    }

    if values.is_empty() {
        return ParamSummaryStats::empty(n_invalid);
    }

    let n_valid = values.len();
    if n_valid == 1 {
        return ParamSummaryStats {
            n_valid,
            n_invalid,
            mean: values[0],
            stddev: 0.0,
            median: values[0],
            lower_q: values[0],
            upper_q: values[0],
            iqr: 0.0,
        };
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = n_valid as f64;
    let mean = sum / n;
    let stddev = ((sumsq - sum * sum / n) / (n - 1.0)).sqrt();
    let median = percentile(&values, 50.0);
    let lower_q = percentile(&values, 25.0);
    let upper_q = percentile(&values, 75.0);

    ParamSummaryStats { n_valid, n_invalid, mean, stddev, median, lower_q, upper_q, iqr: upper_q - lower_q }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_mean_and_quartiles_over_valid_voxels() {
        let dims = [2, 2, 1];
        let mut image = Image3D::new(dims, 0.0);
        let values = [1.0, 2.0, 3.0, 4.0];
        for (i, &v) in values.iter().enumerate() {
            image.set_voxel_linear(i, v).unwrap();
        }
        let tracker = ErrorTracker::new(dims);

        let stats = summary_stats(&image, &tracker, 1.0, false);
        assert_eq!(stats.n_valid, 4);
        assert_eq!(stats.n_invalid, 0);
        assert!((stats.mean - 2.5).abs() < 1e-12);
    }

    #[test]
    fn excludes_voxels_with_error_bits() {
        use crate::error_tracker::ErrorCode;
        let dims = [2, 1, 1];
        let mut image = Image3D::new(dims, 0.0);
        image.set_voxel_linear(0, 10.0).unwrap();
        image.set_voxel_linear(1, 20.0).unwrap();
        let mut tracker = ErrorTracker::new(dims);
        tracker.update_voxel(1, ErrorCode::DceFitFail);

        let stats = summary_stats(&image, &tracker, 1.0, false);
        assert_eq!(stats.n_valid, 1);
        assert_eq!(stats.n_invalid, 1);
        assert!((stats.mean - 10.0).abs() < 1e-12);
    }
}
