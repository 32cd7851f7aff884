//! The `{u8, i16, i32, f32, f64}` datatype enum §6 requires every image
//! writer to accept, plus the Analyze/NIFTI binary datatype codes it maps
//! onto.

use crate::error::{Error, Result};

/// On-disk voxel datatype. Internally every [`madym_core::image3d::Image3D`]
/// stores `f64`; this only governs what a writer serialises to and a reader
/// widens from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    U8,
    I16,
    I32,
    F32,
    F64,
}

impl Datatype {
    /// The Analyze 7.5 / NIFTI-1 `datatype` header code.
    pub fn code(self) -> i16 {
        match self {
            Datatype::U8 => 2,
            Datatype::I16 => 4,
            Datatype::I32 => 8,
            Datatype::F32 => 16,
            Datatype::F64 => 64,
        }
    }

    pub fn from_code(code: i16, path: &str) -> Result<Self> {
        match code {
            2 => Ok(Datatype::U8),
            4 => Ok(Datatype::I16),
            8 => Ok(Datatype::I32),
            16 => Ok(Datatype::F32),
            64 => Ok(Datatype::F64),
            other => Err(Error::UnknownDatatype { path: path.to_string(), code: other as i32 }),
        }
    }

    pub fn bitpix(self) -> i16 {
        match self {
            Datatype::U8 => 8,
            Datatype::I16 => 16,
            Datatype::I32 => 32,
            Datatype::F32 => 32,
            Datatype::F64 => 64,
        }
    }

    pub fn bytes_per_voxel(self) -> usize {
        (self.bitpix() / 8) as usize
    }
}
