//! Analyze 7.5 reader/writer: a `.hdr` header file plus a separate `.img`
//! raw voxel file, both little-endian. No `scl_slope`/`scl_inter` support —
//! that is a NIFTI-1 extension (see [`crate::nifti`]).

use std::path::{Path, PathBuf};

use madym_core::image3d::Image3D;

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::header::{read_header, write_header};
use crate::voxels::{decode, encode};

fn sibling(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

/// Reads an Analyze 7.5 volume given the path to either its `.hdr` or
/// `.img` file (the sibling is derived automatically). Voxel size is taken
/// from `pixdim`; acquisition metadata (TR, flip angle, ...) is not carried
/// by the Analyze format and must come from an XTR sidecar.
pub fn read_analyze(path: &Path) -> Result<Image3D> {
    let hdr_path = sibling(path, "hdr");
    let img_path = sibling(path, "img");

    let hdr_bytes = std::fs::read(&hdr_path).map_err(|source| Error::Io {
        path: hdr_path.display().to_string(),
        source,
    })?;
    let header = read_header(&hdr_bytes, &hdr_path.display().to_string())?;
    let dt = Datatype::from_code(header.datatype_code, &hdr_path.display().to_string())?;

    let img_bytes = std::fs::read(&img_path).map_err(|source| Error::Io {
        path: img_path.display().to_string(),
        source,
    })?;

    let n_voxels = header.dims[0] * header.dims[1] * header.dims[2];
    let expected_bytes = n_voxels * dt.bytes_per_voxel();
    if img_bytes.len() < expected_bytes {
        return Err(Error::DimensionDataMismatch {
            path: img_path.display().to_string(),
            dims: header.dims,
            n_voxels,
        });
    }

    let values = decode(&img_bytes, dt, n_voxels, 0.0, 0.0);
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
    Ok(image)
}

/// Writes `image` as an Analyze 7.5 `.hdr`/`.img` pair at `path` (extension
/// is replaced either way) using datatype `dt`.
pub fn write_analyze(path: &Path, image: &Image3D, dt: Datatype) -> Result<()> {
    let hdr_path = sibling(path, "hdr");
    let img_path = sibling(path, "img");

    let voxel_mm = image.metadata.voxel_size_mm_or_default();
    let origin = image.metadata.origin_mm.unwrap_or([0.0, 0.0, 0.0]);
    let hdr_bytes = write_header(
        image.dims(),
        dt.code(),
        dt.bitpix(),
        [voxel_mm[0] as f32, voxel_mm[1] as f32, voxel_mm[2] as f32],
        0.0,
        0.0,
        [origin[0] as f32, origin[1] as f32, origin[2] as f32],
        false,
    );
    std::fs::write(&hdr_path, &hdr_bytes).map_err(|source| Error::Io {
        path: hdr_path.display().to_string(),
        source,
    })?;

    let img_bytes = encode(image.data(), dt, 0.0, 0.0);
    std::fs::write(&img_path, &img_bytes).map_err(|source| Error::Io {
        path: img_path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.hdr");

        let mut image = Image3D::new([3, 2, 2], 0.0);
        for i in 0..image.n_voxels() {
            image.data_mut()[i] = i as f64 * 1.5;
        }
        image.metadata.voxel_size_mm = Some([1.0, 1.0, 2.0]);

        write_analyze(&path, &image, Datatype::F32).unwrap();
        let read_back = read_analyze(&path).unwrap();

        assert_eq!(read_back.dims(), image.dims());
        for (a, b) in image.data().iter().zip(read_back.data().iter()) {
            assert!((a - b).abs() < 1e-3);
        }
        assert_eq!(read_back.metadata.voxel_size_mm, image.metadata.voxel_size_mm);
    }
}
