//! A dense 3D scalar field with an attached metadata record.
//!
//! Mirrors `mdm_Image3D` from the original implementation: a regular grid of
//! `f64` voxels plus a bag of optional scan-parameter metadata. Linear voxel
//! indexing is column-major (x fastest-varying), the same convention
//! `rad-tools-threed`'s `index::column_major` uses for its voxel grids.

/// Error converting a 3D voxel coordinate to/from a linear index.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("voxel coordinate {coord:?} is out of bounds for image dimensions {dims:?}")]
    OutOfBounds { coord: [usize; 3], dims: [usize; 3] },
    #[error("linear index {index} is out of bounds for {n_voxels} voxels")]
    LinearOutOfBounds { index: usize, n_voxels: usize },
}

/// Maps a column-major voxel coordinate `(x, y, z)` to a linear index.
/// x varies fastest, matching §5's concurrency-partitioning assumption.
pub fn column_major(coord: [usize; 3], dims: [usize; 3]) -> Result<usize, IndexError> {
    if coord[0] >= dims[0] || coord[1] >= dims[1] || coord[2] >= dims[2] {
        return Err(IndexError::OutOfBounds { coord, dims });
    }
    Ok(coord[0] + dims[0] * (coord[1] + dims[1] * coord[2]))
}

/// Inverse of [`column_major`].
pub fn column_major_inverse(index: usize, dims: [usize; 3]) -> Result<[usize; 3], IndexError> {
    let n_voxels = dims[0] * dims[1] * dims[2];
    if index >= n_voxels {
        return Err(IndexError::LinearOutOfBounds { index, n_voxels });
    }
    let x = index % dims[0];
    let y = (index / dims[0]) % dims[1];
    let z = index / (dims[0] * dims[1]);
    Ok([x, y, z])
}

/// What an [`Image3D`] represents, mirrored from the original's `ImageType`
/// tag so XTR sidecars round-trip the same enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Undefined,
    T1WeightedSpgr,
    T1Baseline,
    T1Dynamic,
    M0Map,
    CaMap,
    Degradation,
    T2StarMap,
    DynamicMean,
    Dwi,
    AdcMap,
    ErrorMap,
    AifVoxelMap,
    KineticMap,
}

impl Default for ImageType {
    fn default() -> Self {
        ImageType::Undefined
    }
}

/// Scan-parameter metadata attached to an [`Image3D`]. Every field is
/// optional: absence must be handled explicitly at the point of use (either
/// a documented fallback or a [`crate::error::Error::MissingMetadata`]),
/// never silently assumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub flip_angle_deg: Option<f64>,
    pub tr_s: Option<f64>,
    pub te_s: Option<f64>,
    pub ti_s: Option<f64>,
    pub b_value: Option<f64>,
    pub inversion_efficiency: Option<f64>,
    pub voxel_size_mm: Option<[f64; 3]>,
    pub row_dir_cosines: Option<[f64; 3]>,
    pub col_dir_cosines: Option<[f64; 3]>,
    pub origin_mm: Option<[f64; 3]>,
    pub noise_sigma: Option<f64>,
    pub scale_slope: Option<f64>,
    pub scale_intercept: Option<f64>,
    pub timestamp: Option<f64>,
}

impl Metadata {
    /// Voxel size, falling back to `1.0` mm isotropic if unset — the same
    /// fallback `mdm_Image3D` uses when voxel dims were never supplied.
    pub fn voxel_size_mm_or_default(&self) -> [f64; 3] {
        self.voxel_size_mm.unwrap_or([1.0, 1.0, 1.0])
    }
}

/// A regular grid of `f64` voxels plus its [`Metadata`] and [`ImageType`].
///
/// Constructed either by a loader (`madym-io`) or via [`Image3D::copy`] from
/// a reference image: dimensions and metadata are copied, voxel values are
/// zeroed. An `Image3D` is never resized after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Image3D {
    dims: [usize; 3],
    data: Vec<f64>,
    pub image_type: ImageType,
    pub metadata: Metadata,
}

impl Image3D {
    /// A new image of the given dimensions, all voxels set to `fill`.
    pub fn new(dims: [usize; 3], fill: f64) -> Self {
        let n = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            data: vec![fill; n],
            image_type: ImageType::Undefined,
            metadata: Metadata::default(),
        }
    }

    /// A zero-filled image with the same dimensions and metadata as `self`,
    /// per the copy-construction lifecycle spec.md mandates.
    pub fn copy(&self) -> Self {
        Self {
            dims: self.dims,
            data: vec![0.0; self.data.len()],
            image_type: self.image_type,
            metadata: self.metadata.clone(),
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn n_voxels(&self) -> usize {
        self.data.len()
    }

    pub fn voxel(&self, coord: [usize; 3]) -> Result<f64, IndexError> {
        let i = column_major(coord, self.dims)?;
        Ok(self.data[i])
    }

    pub fn set_voxel(&mut self, coord: [usize; 3], value: f64) -> Result<(), IndexError> {
        let i = column_major(coord, self.dims)?;
        self.data[i] = value;
        Ok(())
    }

    pub fn voxel_linear(&self, index: usize) -> Result<f64, IndexError> {
        if index >= self.data.len() {
            return Err(IndexError::LinearOutOfBounds {
                index,
                n_voxels: self.data.len(),
            });
        }
        Ok(self.data[index])
    }

    pub fn set_voxel_linear(&mut self, index: usize, value: f64) -> Result<(), IndexError> {
        if index >= self.data.len() {
            return Err(IndexError::LinearOutOfBounds {
                index,
                n_voxels: self.data.len(),
            });
        }
        self.data[index] = value;
        Ok(())
    }

    pub fn coord_of(&self, index: usize) -> Result<[usize; 3], IndexError> {
        column_major_inverse(index, self.dims)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// True if `self` and `other` share dimensions. Feeds
    /// [`crate::error::Error::DimensionMismatch`] at call sites that require it.
    pub fn dims_match(&self, other: &Image3D) -> bool {
        self.dims == other.dims
    }

    /// True if `self` and `other` have matching voxel sizes (or both leave
    /// voxel size unset). Feeds
    /// [`crate::error::Error::VoxelSizeMismatch`] at call sites that require it.
    pub fn voxel_size_matches(&self, other: &Image3D) -> bool {
        match (self.metadata.voxel_size_mm, other.metadata.voxel_size_mm) {
            (Some(a), Some(b)) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| (x - y).abs() < 1e-6),
            (None, None) => true,
            _ => false,
        }
    }

    /// Indices of voxels whose value is non-zero, paired with the value.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_major_round_trips() {
        let dims = [4, 3, 2];
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let idx = column_major([x, y, z], dims).unwrap();
                    assert_eq!(column_major_inverse(idx, dims).unwrap(), [x, y, z]);
                }
            }
        }
    }

    #[test]
    fn x_varies_fastest() {
        let dims = [4, 3, 2];
        assert_eq!(column_major([0, 0, 0], dims).unwrap(), 0);
        assert_eq!(column_major([1, 0, 0], dims).unwrap(), 1);
        assert_eq!(column_major([0, 1, 0], dims).unwrap(), 4);
        assert_eq!(column_major([0, 0, 1], dims).unwrap(), 12);
    }

    #[test]
    fn out_of_bounds_coord_is_rejected() {
        let dims = [2, 2, 2];
        assert!(column_major([2, 0, 0], dims).is_err());
    }

    #[test]
    fn copy_zeroes_data_but_keeps_metadata() {
        let mut img = Image3D::new([2, 2, 1], 7.0);
        img.image_type = ImageType::T1Dynamic;
        img.metadata.tr_s = Some(0.01);
        let copy = img.copy();
        assert_eq!(copy.dims(), img.dims());
        assert_eq!(copy.image_type, ImageType::T1Dynamic);
        assert_eq!(copy.metadata.tr_s, Some(0.01));
        assert!(copy.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn dims_and_voxel_size_matching() {
        let mut a = Image3D::new([2, 2, 2], 0.0);
        let mut b = Image3D::new([2, 2, 2], 0.0);
        assert!(a.dims_match(&b));
        assert!(a.voxel_size_matches(&b));

        a.metadata.voxel_size_mm = Some([1.0, 1.0, 1.0]);
        assert!(!a.voxel_size_matches(&b));
        b.metadata.voxel_size_mm = Some([1.0, 1.0, 1.0]);
        assert!(a.voxel_size_matches(&b));

        let c = Image3D::new([3, 2, 2], 0.0);
        assert!(!a.dims_match(&c));
    }

    #[test]
    fn nonzero_iterates_only_set_voxels() {
        let mut img = Image3D::new([2, 1, 1], 0.0);
        img.set_voxel([1, 0, 0], 3.5).unwrap();
        let nz: Vec<_> = img.nonzero().collect();
        assert_eq!(nz, vec![(1, 3.5)]);
    }
}
