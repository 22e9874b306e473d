//! Little-endian cursor reader and writer helpers shared by every codec
//!
//! `Reader::read_prefixed` is the only place a length read off the wire is
//! trusted. Codecs never slice the buffer with a length they parsed themselves.

use crate::error::{CodecError, Result};
use crate::MAX_PAYLOAD_SIZE;

/// Length written in place of a payload when there is nothing to send.
pub const ABSENT_LENGTH: i32 = -1;

/// Forward-only cursor over a borrowed datagram.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.remaining() < N {
            return Err(CodecError::TooShort {
                needed: self.pos + N,
                actual: self.buf.len(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    /// Any nonzero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.take::<1>().map(|[b]| b != 0)
    }

    /// Reads the magic tag and rejects anything that is not `expected`.
    pub fn expect_magic(&mut self, expected: u32) -> Result<()> {
        let found = self.read_u32()?;
        if found != expected {
            return Err(CodecError::BadMagic { expected, found });
        }
        Ok(())
    }

    /// Reads an `i32` length followed by that many bytes.
    ///
    /// Returns `Ok(None)` when the declared length is zero, negative, or larger
    /// than [`MAX_PAYLOAD_SIZE`]. In the oversized case the declared bytes are
    /// left unread and nothing is allocated. A length that fits the limit but
    /// runs past the end of the buffer is `TruncatedPayload`.
    pub fn read_prefixed(&mut self) -> Result<Option<&'a [u8]>> {
        let declared = self.read_i32()?;
        if declared <= 0 {
            return Ok(None);
        }
        let len = declared as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Ok(None);
        }
        if len > self.remaining() {
            return Err(CodecError::TruncatedPayload {
                expected: len,
                available: self.remaining(),
            });
        }
        let block = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(Some(block))
    }
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

/// Writes `block` behind its length, or the absent sentinel when it is empty.
///
/// Fails instead of writing a block the reader would refuse.
pub fn write_prefixed(out: &mut Vec<u8>, block: &[u8]) -> Result<()> {
    if block.is_empty() {
        write_i32(out, ABSENT_LENGTH);
        return Ok(());
    }
    if block.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge {
            len: block.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    write_i32(out, block.len() as i32);
    out.extend_from_slice(block);
    Ok(())
}
