//! NIFTI-1 reader/writer (`.nii`, `.nii.gz`): a single file holding the
//! 348-byte header immediately followed by voxel data (no extension
//! blocks are written or expected on read), little-endian throughout.
//! `scl_slope`/`scl_inter` are applied on read/write when `apply_scaling`
//! is set, per §6.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use madym_core::image3d::Image3D;

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::header::{read_header, write_header, HEADER_SIZE};
use crate::voxels::{decode, encode};

fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

fn read_raw(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    if is_gzipped(path) {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(out)
    } else {
        Ok(raw)
    }
}

/// Reads a `.nii`/`.nii.gz` volume at `path`. When `apply_scaling` is set
/// and the file carries a nonzero `scl_slope`, voxel values are
/// `raw * scl_slope + scl_inter`.
pub fn read_nifti(path: &Path, apply_scaling: bool) -> Result<Image3D> {
    let bytes = read_raw(path)?;
    let header = read_header(&bytes, &path.display().to_string())?;
    let dt = Datatype::from_code(header.datatype_code, &path.display().to_string())?;

    let n_voxels = header.dims[0] * header.dims[1] * header.dims[2];
    let offset = header.vox_offset as usize;
    let expected_len = offset + n_voxels * dt.bytes_per_voxel();
    if bytes.len() < expected_len {
        return Err(Error::DimensionDataMismatch {
            path: path.display().to_string(),
            dims: header.dims,
            n_voxels,
        });
    }

    let (slope, inter) = if apply_scaling && header.scl_slope != 0.0 {
        (header.scl_slope as f64, header.scl_inter as f64)
    } else {
        (0.0, 0.0)
    };

    let values = decode(&bytes[offset..], dt, n_voxels, slope, inter);
    let mut image = Image3D::new(header.dims, 0.0);
    for (i, v) in values.into_iter().enumerate() {
        image.data_mut()[i] = v;
    }
    image.metadata.voxel_size_mm = Some([
        header.pixdim_mm[0] as f64,
        header.pixdim_mm[1] as f64,
        header.pixdim_mm[2] as f64,
    ]);
    image.metadata.origin_mm = Some([
        header.origin_mm[0] as f64,
        header.origin_mm[1] as f64,
        header.origin_mm[2] as f64,
    ]);
    if slope != 0.0 {
        image.metadata.scale_slope = Some(slope);
        image.metadata.scale_intercept = Some(inter);
    }
    Ok(image)
}

/// Writes `image` as a single-file NIFTI-1 volume. Gzips when `path` ends
/// in `.gz`. `scl_slope`/`scl_inter` are written from
/// `image.metadata.scale_slope`/`scale_intercept` when `apply_scaling` is
/// set and both are present; otherwise they are written as zero (meaning
/// "no scaling", per the NIFTI-1 convention).
pub fn write_nifti(path: &Path, image: &Image3D, dt: Datatype, apply_scaling: bool) -> Result<()> {
    let voxel_mm = image.metadata.voxel_size_mm_or_default();
    let origin = image.metadata.origin_mm.unwrap_or([0.0, 0.0, 0.0]);
    let (slope, inter) = if apply_scaling {
        (
            image.metadata.scale_slope.unwrap_or(0.0) as f32,
            image.metadata.scale_intercept.unwrap_or(0.0) as f32,
        )
    } else {
        (0.0, 0.0)
    };

    let mut header = write_header(
        image.dims(),
        dt.code(),
        dt.bitpix(),
        [voxel_mm[0] as f32, voxel_mm[1] as f32, voxel_mm[2] as f32],
        slope,
        inter,
        [origin[0] as f32, origin[1] as f32, origin[2] as f32],
        true,
    );
    debug_assert_eq!(header.len(), HEADER_SIZE);

    let voxel_bytes = encode(image.data(), dt, slope as f64, inter as f64);
    header.extend_from_slice(&voxel_bytes);

    if is_gzipped(path) {
        let file = std::fs::File::create(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        use std::io::Write;
        encoder.write_all(&header).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        encoder.finish().map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
    } else {
        std::fs::write(path, &header).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Image3D {
        let mut image = Image3D::new([4, 3, 2], 0.0);
        for i in 0..image.n_voxels() {
            image.data_mut()[i] = (i as f64) * 0.25 - 1.0;
        }
        image.metadata.voxel_size_mm = Some([1.0, 1.0, 1.5]);
        image
    }

    #[test]
    fn write_then_read_round_trips_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.nii");
        let image = sample_image();

        write_nifti(&path, &image, Datatype::F32, false).unwrap();
        let read_back = read_nifti(&path, false).unwrap();

        assert_eq!(read_back.dims(), image.dims());
        for (a, b) in image.data().iter().zip(read_back.data().iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn write_then_read_round_trips_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.nii.gz");
        let image = sample_image();

        write_nifti(&path, &image, Datatype::F64, false).unwrap();
        let read_back = read_nifti(&path, false).unwrap();

        assert_eq!(read_back.dims(), image.dims());
        for (a, b) in image.data().iter().zip(read_back.data().iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn scl_slope_is_applied_on_read_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaled.nii");
        let mut image = sample_image();
        image.metadata.scale_slope = Some(2.0);
        image.metadata.scale_intercept = Some(1.0);

        write_nifti(&path, &image, Datatype::I16, true).unwrap();

        let unscaled = read_nifti(&path, false).unwrap();
        let scaled = read_nifti(&path, true).unwrap();
        assert_ne!(unscaled.data()[5], scaled.data()[5]);
    }
}
