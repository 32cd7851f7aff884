//! The shared 348-byte Analyze 7.5 / NIFTI-1 header layout. NIFTI-1 reuses
//! the Analyze struct, repurposing a handful of previously-unused fields
//! (`scl_slope`, `scl_inter`, `qform`/`sform`, the `magic` tag); this module
//! reads/writes the subset both formats need for a dense 3D scalar volume.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 348;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeHeader {
    pub dims: [usize; 3],
    pub datatype_code: i16,
    pub pixdim_mm: [f32; 3],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub origin_mm: [f32; 3],
    /// `true` for a NIFTI-1 single-file image (`magic == "n+1\0"`); governs
    /// whether `scl_slope`/`scl_inter` are meaningful on read.
    pub is_nifti: bool,
}

/// Reads the 348-byte header common to Analyze 7.5 and NIFTI-1.
pub fn read_header(bytes: &[u8], path: &str) -> Result<VolumeHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::FileFormatBad {
            path: path.to_string(),
            detail: format!("header is {} bytes, expected at least {HEADER_SIZE}", bytes.len()),
        });
    }
    let mut c = Cursor::new(bytes);

    let sizeof_hdr = c.read_i32::<LittleEndian>().map_err(|e| io_err(path, e))?;
    if sizeof_hdr != HEADER_SIZE as i32 {
        return Err(Error::FileFormatBad {
            path: path.to_string(),
            detail: format!("sizeof_hdr field is {sizeof_hdr}, expected {HEADER_SIZE}"),
        });
    }

    c.set_position(40);
    let mut dim = [0i16; 8];
    for d in dim.iter_mut() {
        *d = c.read_i16::<LittleEndian>().map_err(|e| io_err(path, e))?;
    }

    c.set_position(70);
    let datatype_code = c.read_i16::<LittleEndian>().map_err(|e| io_err(path, e))?;

    c.set_position(76);
    let mut pixdim = [0f32; 8];
    for p in pixdim.iter_mut() {
        *p = c.read_f32::<LittleEndian>().map_err(|e| io_err(path, e))?;
    }
    let vox_offset = c.read_f32::<LittleEndian>().map_err(|e| io_err(path, e))?;
    let scl_slope = c.read_f32::<LittleEndian>().map_err(|e| io_err(path, e))?;
    let scl_inter = c.read_f32::<LittleEndian>().map_err(|e| io_err(path, e))?;

    // qoffset_x/y/z sit after qform_code, sform_code and the quaternion
    // triple (268 = 252 + 2 + 2 + 3*4).
    c.set_position(268);
    let mut qoffset = [0f32; 3];
    for q in qoffset.iter_mut() {
        *q = c.read_f32::<LittleEndian>().map_err(|e| io_err(path, e))?;
    }

    c.set_position(344);
    let mut magic = [0u8; 4];
    c.read_exact(&mut magic).map_err(|e| io_err(path, e))?;
    let is_nifti = &magic == b"n+1\0" || &magic == b"ni1\0";

    let dims = [dim[1].max(1) as usize, dim[2].max(1) as usize, dim[3].max(1) as usize];
    let pixdim_mm = [
        if pixdim[1] != 0.0 { pixdim[1] } else { 1.0 },
        if pixdim[2] != 0.0 { pixdim[2] } else { 1.0 },
        if pixdim[3] != 0.0 { pixdim[3] } else { 1.0 },
    ];

    Ok(VolumeHeader {
        dims,
        datatype_code,
        pixdim_mm,
        vox_offset: if vox_offset > 0.0 { vox_offset } else { HEADER_SIZE as f32 },
        scl_slope: if is_nifti { scl_slope } else { 0.0 },
        scl_inter: if is_nifti { scl_inter } else { 0.0 },
        origin_mm: qoffset,
        is_nifti,
    })
}

fn io_err(path: &str, source: std::io::Error) -> Error {
    Error::Io { path: path.to_string(), source }
}

/// Writes the 348-byte header. `nifti_magic`, when set, writes a NIFTI-1
/// single-file magic (`"n+1\0"`) and the `scl_slope`/`scl_inter` pair;
/// otherwise the header is a plain Analyze 7.5 header (magic left zeroed).
#[allow(clippy::too_many_arguments)]
pub fn write_header(
    dims: [usize; 3],
    datatype_code: i16,
    bitpix: i16,
    pixdim_mm: [f32; 3],
    scl_slope: f32,
    scl_inter: f32,
    origin_mm: [f32; 3],
    nifti_magic: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE];
    {
        let mut c = Cursor::new(&mut buf[..]);
        c.write_i32::<LittleEndian>(HEADER_SIZE as i32).unwrap();
        c.set_position(40);
        let dim = [4i16, dims[0] as i16, dims[1] as i16, dims[2] as i16, 1, 0, 0, 0];
        for d in dim {
            c.write_i16::<LittleEndian>(d).unwrap();
        }
        c.set_position(70);
        c.write_i16::<LittleEndian>(datatype_code).unwrap();
        c.write_i16::<LittleEndian>(bitpix).unwrap();
        c.set_position(76);
        let pixdim = [1.0f32, pixdim_mm[0], pixdim_mm[1], pixdim_mm[2], 0.0, 0.0, 0.0, 0.0];
        for p in pixdim {
            c.write_f32::<LittleEndian>(p).unwrap();
        }
        c.write_f32::<LittleEndian>(HEADER_SIZE as f32).unwrap();
        c.write_f32::<LittleEndian>(scl_slope).unwrap();
        c.write_f32::<LittleEndian>(scl_inter).unwrap();
        c.set_position(268);
        for q in origin_mm {
            c.write_f32::<LittleEndian>(q).unwrap();
        }
        if nifti_magic {
            c.set_position(344);
            c.write_all(b"n+1\0").unwrap();
        }
    }
    buf
}
