// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors for CDR buffers.
//!
//! Primitives are naturally aligned relative to the start of the cursor's
//! buffer (the byte right after the encapsulation header).

use super::{SerError, SerResult};

/// Byte order of a CDR stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Generate aligned write methods for primitive types.
///
/// Each generated method aligns to the size of the type, converts the value
/// using the writer's byte order and appends it.
macro_rules! impl_write {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> SerResult<()> {
            self.align($size)?;
            let bytes = match self.endianness {
                Endianness::Big => value.to_be_bytes(),
                Endianness::Little => value.to_le_bytes(),
            };
            self.write_bytes(&bytes)
        }
    };
}

/// Generate aligned read methods for primitive types.
///
/// Each generated method aligns, checks bounds (returns
/// `SerError::ReadFailed` on overflow) and converts using the cursor's
/// byte order.
macro_rules! impl_read {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> SerResult<$type> {
            self.align($size)?;
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(match self.endianness {
                Endianness::Big => <$type>::from_be_bytes(bytes),
                Endianness::Little => <$type>::from_le_bytes(bytes),
            })
        }
    };
}

/// Growable CDR writer.
#[derive(Debug, Clone)]
pub struct CdrWriter {
    buffer: Vec<u8>,
    endianness: Endianness,
}

impl CdrWriter {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            buffer: Vec::new(),
            endianness,
        }
    }

    pub fn with_capacity(endianness: Endianness, capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            endianness,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Pad with zeros up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> SerResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let pad = (alignment - self.buffer.len() % alignment) % alignment;
        self.buffer.resize(self.buffer.len() + pad, 0);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> SerResult<()> {
        self.buffer.push(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> SerResult<()> {
        self.write_u8(u8::from(value))
    }

    impl_write!(write_u16, u16, 2);
    impl_write!(write_i16, i16, 2);
    impl_write!(write_u32, u32, 4);
    impl_write!(write_i32, i32, 4);
    impl_write!(write_u64, u64, 8);
    impl_write!(write_i64, i64, 8);

    pub fn write_f32(&mut self, value: f32) -> SerResult<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> SerResult<()> {
        self.write_u64(value.to_bits())
    }

    /// CDR string: length including the terminating NUL, bytes, NUL.
    pub fn write_string(&mut self, value: &str) -> SerResult<()> {
        if value.as_bytes().contains(&0) {
            return Err(SerError::EncoderFailed {
                reason: "string contains NUL".into(),
            });
        }
        let len = u32::try_from(value.len() + 1).map_err(|_| SerError::EncoderFailed {
            reason: "string too long".into(),
        })?;
        self.write_u32(len)?;
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    /// Sequence of octets: u32 length then the raw bytes.
    pub fn write_octets(&mut self, value: &[u8]) -> SerResult<()> {
        let len = u32::try_from(value.len()).map_err(|_| SerError::EncoderFailed {
            reason: "sequence too long".into(),
        })?;
        self.write_u32(len)?;
        self.write_bytes(value)
    }

    /// Raw bytes, no alignment.
    pub fn write_bytes(&mut self, data: &[u8]) -> SerResult<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Immutable cursor for reading (bounds-checked, zero-copy).
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
    endianness: Endianness,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8], endianness: Endianness) -> Self {
        Self {
            buffer,
            offset: 0,
            endianness,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    pub fn align(&mut self, alignment: usize) -> SerResult<()> {
        if alignment <= 1 {
            return Ok(());
        }
        let mask = alignment - 1;
        let aligned = (self.offset + mask) & !mask;
        if aligned > self.buffer.len() {
            return Err(SerError::ReadFailed {
                offset: aligned,
                reason: "unexpected end of buffer".into(),
            });
        }
        self.offset = aligned;
        Ok(())
    }

    pub fn read_u8(&mut self) -> SerResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> SerResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SerError::InvalidData {
                reason: format!("invalid boolean {}", other),
            }),
        }
    }

    impl_read!(read_u16, u16, 2);
    impl_read!(read_i16, i16, 2);
    impl_read!(read_u32, u32, 4);
    impl_read!(read_i32, i32, 4);
    impl_read!(read_u64, u64, 8);
    impl_read!(read_i64, i64, 8);

    pub fn read_f32(&mut self) -> SerResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> SerResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_string(&mut self) -> SerResult<String> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Err(SerError::InvalidData {
                reason: "string length 0".into(),
            });
        }
        let offset = self.offset;
        let bytes = self.read_bytes(len)?;
        let (text, nul) = bytes.split_at(len - 1);
        if nul[0] != 0 {
            return Err(SerError::InvalidData {
                reason: "string not NUL terminated".into(),
            });
        }
        String::from_utf8(text.to_vec()).map_err(|_| SerError::ReadFailed {
            offset,
            reason: "string is not UTF-8".into(),
        })
    }

    pub fn read_octets(&mut self) -> SerResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_bytes(&mut self, len: usize) -> SerResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(SerError::ReadFailed {
                offset: self.offset,
                reason: "unexpected end of buffer".into(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
}
