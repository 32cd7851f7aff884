//! XTR sidecar format (§6): one `key<TAB>value` line per field. Unknown keys
//! are rejected with a typed error rather than silently ignored, matching
//! the original's strict sidecar reader.

use std::io::Write;
use std::path::Path;

use madym_core::image3d::{ImageType, Metadata};

use crate::error::{Error, Result};

const RECOGNISED_KEYS: &[&str] = &[
    "TimeStamp",
    "ImageType",
    "FlipAngle",
    "TR",
    "TE",
    "TI",
    "B",
    "Xmm",
    "Ymm",
    "Zmm",
    "RowDirCosineX",
    "RowDirCosineY",
    "RowDirCosineZ",
    "ColDirCosineX",
    "ColDirCosineY",
    "ColDirCosineZ",
    "OriginX",
    "OriginY",
    "OriginZ",
    "NoiseSigma",
];

/// Maps `ImageType` to/from the stable integer enum the XTR `ImageType` key
/// carries, mirroring `mdm_Image3D::ImageType`.
fn image_type_to_code(t: ImageType) -> i32 {
    match t {
        ImageType::Undefined => 0,
        ImageType::T1WeightedSpgr => 1,
        ImageType::T1Baseline => 2,
        ImageType::T1Dynamic => 3,
        ImageType::M0Map => 4,
        ImageType::CaMap => 5,
        ImageType::Degradation => 6,
        ImageType::T2StarMap => 7,
        ImageType::DynamicMean => 8,
        ImageType::Dwi => 9,
        ImageType::AdcMap => 10,
        ImageType::ErrorMap => 11,
        ImageType::AifVoxelMap => 12,
        ImageType::KineticMap => 13,
    }
}

fn image_type_from_code(code: i32) -> ImageType {
    match code {
        1 => ImageType::T1WeightedSpgr,
        2 => ImageType::T1Baseline,
        3 => ImageType::T1Dynamic,
        4 => ImageType::M0Map,
        5 => ImageType::CaMap,
        6 => ImageType::Degradation,
        7 => ImageType::T2StarMap,
        8 => ImageType::DynamicMean,
        9 => ImageType::Dwi,
        10 => ImageType::AdcMap,
        11 => ImageType::ErrorMap,
        12 => ImageType::AifVoxelMap,
        13 => ImageType::KineticMap,
        _ => ImageType::Undefined,
    }
}

/// Converts an XTR `TimeStamp` (`HHMMSS.sss`, a single decimal) into minutes
/// since midnight, the unit `VolumeAnalysis`'s dynamic time grid uses.
pub fn timestamp_to_minutes(hhmmss: f64) -> f64 {
    let hh = (hhmmss / 10000.0).floor();
    let mm = ((hhmmss - hh * 10000.0) / 100.0).floor();
    let ss = hhmmss - hh * 10000.0 - mm * 100.0;
    hh * 60.0 + mm + ss / 60.0
}

/// Inverse of [`timestamp_to_minutes`], for writing a sidecar back out.
pub fn minutes_to_timestamp(minutes: f64) -> f64 {
    let total_seconds = minutes * 60.0;
    let hh = (total_seconds / 3600.0).floor();
    let mm = ((total_seconds - hh * 3600.0) / 60.0).floor();
    let ss = total_seconds - hh * 3600.0 - mm * 60.0;
    hh * 10000.0 + mm * 100.0 + ss
}

/// Reads an XTR sidecar at `path` into a [`Metadata`] record plus the
/// [`ImageType`] tag. Rejects any key not in [`RECOGNISED_KEYS`].
pub fn read_xtr(path: &Path) -> Result<(Metadata, ImageType)> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut meta = Metadata::default();
    let mut image_type = ImageType::Undefined;
    let mut row = [0.0_f64; 3];
    let mut col = [0.0_f64; 3];
    let mut origin = [0.0_f64; 3];
    let mut row_set = false;
    let mut col_set = false;
    let mut origin_set = false;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        if !RECOGNISED_KEYS.contains(&key) {
            return Err(Error::UnknownXtrKey {
                path: path.display().to_string(),
                key: key.to_string(),
            });
        }
        let parse = |v: &str| -> Result<f64> {
            v.parse::<f64>().map_err(|e| Error::FileFormatBad {
                path: path.display().to_string(),
                detail: format!("line {}: cannot parse '{}' as a number: {}", line_no + 1, v, e),
            })
        };
        match key {
            "TimeStamp" => meta.timestamp = Some(timestamp_to_minutes(parse(value)?)),
            "ImageType" => image_type = image_type_from_code(parse(value)? as i32),
            "FlipAngle" => meta.flip_angle_deg = Some(parse(value)?),
            "TR" => meta.tr_s = Some(parse(value)?),
            "TE" => meta.te_s = Some(parse(value)?),
            "TI" => meta.ti_s = Some(parse(value)?),
            "B" => meta.b_value = Some(parse(value)?),
            "Xmm" => {
                let vsize = meta.voxel_size_mm.get_or_insert([1.0, 1.0, 1.0]);
                vsize[0] = parse(value)?;
            }
            "Ymm" => {
                let vsize = meta.voxel_size_mm.get_or_insert([1.0, 1.0, 1.0]);
                vsize[1] = parse(value)?;
            }
            "Zmm" => {
                let vsize = meta.voxel_size_mm.get_or_insert([1.0, 1.0, 1.0]);
                vsize[2] = parse(value)?;
            }
            "RowDirCosineX" => { row[0] = parse(value)?; row_set = true; }
            "RowDirCosineY" => { row[1] = parse(value)?; row_set = true; }
            "RowDirCosineZ" => { row[2] = parse(value)?; row_set = true; }
            "ColDirCosineX" => { col[0] = parse(value)?; col_set = true; }
            "ColDirCosineY" => { col[1] = parse(value)?; col_set = true; }
            "ColDirCosineZ" => { col[2] = parse(value)?; col_set = true; }
            "OriginX" => { origin[0] = parse(value)?; origin_set = true; }
            "OriginY" => { origin[1] = parse(value)?; origin_set = true; }
            "OriginZ" => { origin[2] = parse(value)?; origin_set = true; }
            "NoiseSigma" => meta.noise_sigma = Some(parse(value)?),
            _ => unreachable!("filtered by RECOGNISED_KEYS above"),
        }
    }

    if row_set {
        meta.row_dir_cosines = Some(row);
    }
    if col_set {
        meta.col_dir_cosines = Some(col);
    }
    if origin_set {
        meta.origin_mm = Some(origin);
    }

    Ok((meta, image_type))
}

/// Writes `meta`/`image_type` to an XTR sidecar at `path`. Only fields that
/// are `Some` are written; the nine direction-cosine keys are written
/// together or not at all.
pub fn write_xtr(path: &Path, meta: &Metadata, image_type: ImageType) -> Result<()> {
    let mut out = String::new();
    let mut push = |key: &str, value: f64| {
        out.push_str(key);
        out.push('\t');
        out.push_str(&value.to_string());
        out.push('\n');
    };

    if let Some(ts) = meta.timestamp {
        push("TimeStamp", minutes_to_timestamp(ts));
    }
    push("ImageType", image_type_to_code(image_type) as f64);
    if let Some(v) = meta.flip_angle_deg {
        push("FlipAngle", v);
    }
    if let Some(v) = meta.tr_s {
        push("TR", v);
    }
    if let Some(v) = meta.te_s {
        push("TE", v);
    }
    if let Some(v) = meta.ti_s {
        push("TI", v);
    }
    if let Some(v) = meta.b_value {
        push("B", v);
    }
    if let Some(v) = meta.voxel_size_mm {
        push("Xmm", v[0]);
        push("Ymm", v[1]);
        push("Zmm", v[2]);
    }
    if let Some(v) = meta.row_dir_cosines {
        push("RowDirCosineX", v[0]);
        push("RowDirCosineY", v[1]);
        push("RowDirCosineZ", v[2]);
    }
    if let Some(v) = meta.col_dir_cosines {
        push("ColDirCosineX", v[0]);
        push("ColDirCosineY", v[1]);
        push("ColDirCosineZ", v[2]);
    }
    if let Some(v) = meta.origin_mm {
        push("OriginX", v[0]);
        push("OriginY", v[1]);
        push("OriginZ", v[2]);
    }
    if let Some(v) = meta.noise_sigma {
        push("NoiseSigma", v);
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
    fn timestamp_round_trips() {
        let hhmmss = 143025.5;
        let minutes = timestamp_to_minutes(hhmmss);
        let back = minutes_to_timestamp(minutes);
        assert_relative_eq!(back, hhmmss, epsilon = 1e-6);
    }

    #[test]
    fn write_then_read_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.xtr");

        let mut meta = Metadata::default();
        meta.flip_angle_deg = Some(15.0);
        meta.tr_s = Some(0.004);
        meta.voxel_size_mm = Some([1.0, 1.0, 2.0]);
        meta.noise_sigma = Some(0.5);

        write_xtr(&path, &meta, ImageType::T1Dynamic).unwrap();
        let (read_meta, read_type) = read_xtr(&path).unwrap();

        assert_eq!(read_type, ImageType::T1Dynamic);
        assert_eq!(read_meta.flip_angle_deg, meta.flip_angle_deg);
        assert_eq!(read_meta.tr_s, meta.tr_s);
        assert_eq!(read_meta.voxel_size_mm, meta.voxel_size_mm);
        assert_eq!(read_meta.noise_sigma, meta.noise_sigma);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xtr");
        std::fs::write(&path, "NotARealKey\t1.0\n").unwrap();
        let err = read_xtr(&path).unwrap_err();
        assert!(matches!(err, Error::UnknownXtrKey { .. }));
    }
}
