use crate::codec::Reader;
use crate::error::{CodecError, Result};

/// Magic tag leading every encoded point
pub const POINT3_MAGIC: u32 = 0xDE3_3789;

/// Encoded size of a point: magic plus three floats
pub const POINT3_ENCODED_LEN: usize = 16;

/// A position in 3D world space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn encode(&self) -> [u8; POINT3_ENCODED_LEN] {
        let mut out = [0u8; POINT3_ENCODED_LEN];
        out[0..4].copy_from_slice(&POINT3_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.x.to_le_bytes());
        out[8..12].copy_from_slice(&self.y.to_le_bytes());
        out[12..16].copy_from_slice(&self.z.to_le_bytes());
        out
    }

    /// Decodes a point from a self-contained slice; bytes past the first 16
    /// are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < POINT3_ENCODED_LEN {
            return Err(CodecError::TooShort {
                needed: POINT3_ENCODED_LEN,
                actual: data.len(),
            });
        }
        let mut reader = Reader::new(data);
        reader.expect_magic(POINT3_MAGIC)?;
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
        })
    }
}
