//! Raw voxel (de)serialisation for the `{u8, i16, i32, f32, f64}` datatypes,
//! shared by the Analyze and NIFTI readers/writers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::datatype::Datatype;

/// Decodes `n_voxels` raw samples of `dt` from `bytes`, applying
/// `value * slope + inter` per sample when `slope != 0.0` (NIFTI
/// `scl_slope`/`scl_inter`; Analyze callers pass `slope = 0.0` to disable).
pub fn decode(bytes: &[u8], dt: Datatype, n_voxels: usize, slope: f64, inter: f64) -> Vec<f64> {
    let mut c = std::io::Cursor::new(bytes);
    let mut out = Vec::with_capacity(n_voxels);
    let apply = |v: f64| if slope != 0.0 { v * slope + inter } else { v };
    for _ in 0..n_voxels {
        let raw = match dt {
            Datatype::U8 => c.read_u8().unwrap_or(0) as f64,
            Datatype::I16 => c.read_i16::<LittleEndian>().unwrap_or(0) as f64,
            Datatype::I32 => c.read_i32::<LittleEndian>().unwrap_or(0) as f64,
            Datatype::F32 => c.read_f32::<LittleEndian>().unwrap_or(0.0) as f64,
            Datatype::F64 => c.read_f64::<LittleEndian>().unwrap_or(0.0),
        };
        out.push(apply(raw));
    }
    out
}

/// Encodes `values` as `dt`, optionally applying the inverse NIFTI scaling
/// (`(value - inter) / slope`) before truncating/rounding into the target
/// integer or float representation.
pub fn encode(values: &[f64], dt: Datatype, slope: f64, inter: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * dt.bytes_per_voxel());
    for &v in values {
        let v = if slope != 0.0 { (v - inter) / slope } else { v };
        match dt {
            Datatype::U8 => out.write_u8(v.round().clamp(0.0, 255.0) as u8).unwrap(),
            Datatype::I16 => out.write_i16::<LittleEndian>(v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16).unwrap(),
            Datatype::I32 => out.write_i32::<LittleEndian>(v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32).unwrap(),
            Datatype::F32 => out.write_f32::<LittleEndian>(v as f32).unwrap(),
            Datatype::F64 => out.write_f64::<LittleEndian>(v).unwrap(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_round_trips_exactly() {
        let values = vec![1.5, -2.25, 0.0, 3.125];
        let bytes = encode(&values, Datatype::F64, 0.0, 0.0);
        let back = decode(&bytes, Datatype::F64, values.len(), 0.0, 0.0);
        assert_eq!(values, back);
    }

    #[test]
    fn i16_round_trips_to_integer_precision() {
        let values = vec![1.0, -2.0, 1000.0];
        let bytes = encode(&values, Datatype::I16, 0.0, 0.0);
        let back = decode(&bytes, Datatype::I16, values.len(), 0.0, 0.0);
        assert_eq!(values, back);
    }

    #[test]
    fn scaling_is_applied_and_inverted() {
        let values = vec![10.0, 20.0, 30.0];
        let slope = 0.1;
        let inter = 1.0;
        let bytes = encode(&values, Datatype::I16, slope, inter);
        let back = decode(&bytes, Datatype::I16, values.len(), slope, inter);
        for (a, b) in values.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
