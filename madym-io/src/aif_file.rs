//! AIF/PIF ASCII file format (§4.1, §6): one whitespace-separated
//! `(time_minutes, concentration_mM)` pair per line, exactly N lines for
//! an N-point dynamic series.

use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Reads exactly `n` whitespace-separated `(time, concentration)` pairs.
/// Fewer than `n` pairs is a [`Error::WrongPairCount`] failure (the spec's
/// `FILE_FORMAT_BAD`); the concentration column is what callers install as
/// the AIF's baseline sequence via `Aif::set_baseline_aif`.
pub fn read_pairs(path: &Path, n: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut times = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(t_str), Some(c_str)) = (fields.next(), fields.next()) else {
            return Err(Error::FileFormatBad {
                path: path.display().to_string(),
                detail: format!("line {}: expected two whitespace-separated fields", line_no + 1),
            });
        };
        let t: f64 = t_str.parse().map_err(|_| Error::FileFormatBad {
            path: path.display().to_string(),
            detail: format!("line {}: cannot parse time '{}'", line_no + 1, t_str),
        })?;
        let c: f64 = c_str.parse().map_err(|_| Error::FileFormatBad {
            path: path.display().to_string(),
            detail: format!("line {}: cannot parse concentration '{}'", line_no + 1, c_str),
        })?;
        times.push(t);
        values.push(c);
    }

    if times.len() != n {
        return Err(Error::WrongPairCount {
            path: path.display().to_string(),
            expected: n,
            actual: times.len(),
        });
    }

    Ok((times, values))
}

/// Writes `(time, value)` pairs, one whitespace-separated pair per line.
pub fn write_pairs(path: &Path, times: &[f64], values: &[f64]) -> Result<()> {
    let mut out = String::new();
    for (&t, &v) in times.iter().zip(values.iter()) {
        out.push_str(&format!("{t}\t{v}\n"));
    }
    let mut file = std::fs::File::create(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    file.write_all(out.as_bytes()).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn write_then_read_round_trips_to_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aif.txt");
        let times: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let values: Vec<f64> = times.iter().map(|&t| (-t).exp()).collect();

        write_pairs(&path, &times, &values).unwrap();
        let (read_times, read_values) = read_pairs(&path, 10).unwrap();

        for (a, b) in values.iter().zip(read_values.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
        for (a, b) in times.iter().zip(read_times.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn too_few_pairs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aif.txt");
        write_pairs(&path, &[0.0, 1.0], &[0.0, 1.0]).unwrap();
        let err = read_pairs(&path, 5).unwrap_err();
        assert!(matches!(err, Error::WrongPairCount { expected: 5, actual: 2, .. }));
    }
}
