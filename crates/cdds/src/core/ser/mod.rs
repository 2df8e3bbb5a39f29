// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CDR serialization helpers used by the default sample representation.
//!
//! Samples are stored little-endian behind a 4-byte encapsulation header;
//! keys are serialized big-endian without a header, which is the form the
//! 16-byte key hash is derived from.

pub mod cursor;

pub use cursor::{CdrWriter, Cursor, Endianness};

use std::fmt;

/// Encapsulation header for plain CDR, big-endian.
pub const CDR_BE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
/// Encapsulation header for plain CDR, little-endian.
pub const CDR_LE: [u8; 4] = [0x00, 0x01, 0x00, 0x00];
/// Size of the encapsulation header.
pub const ENCAPSULATION_HEADER_SIZE: usize = 4;

/// Serialization error used within core::ser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerError {
    EncoderFailed { reason: String },
    DecoderFailed { reason: String },
    WriteFailed { offset: usize, reason: String },
    ReadFailed { offset: usize, reason: String },
    InvalidData { reason: String },
}

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerError::EncoderFailed { reason } => write!(f, "encoder failed: {}", reason),
            SerError::DecoderFailed { reason } => write!(f, "decoder failed: {}", reason),
            SerError::WriteFailed { offset, reason } => {
                write!(f, "write failed at offset {}: {}", offset, reason)
            }
            SerError::ReadFailed { offset, reason } => {
                write!(f, "read failed at offset {}: {}", offset, reason)
            }
            SerError::InvalidData { reason } => write!(f, "invalid data: {}", reason),
        }
    }
}

impl std::error::Error for SerError {}

impl From<SerError> for crate::dds::Error {
    fn from(e: SerError) -> Self {
        crate::dds::Error::Serialization(e.to_string())
    }
}

pub type SerResult<T> = core::result::Result<T, SerError>;

/// Endianness announced by an encapsulation header.
pub fn header_endianness(header: &[u8]) -> SerResult<Endianness> {
    match header {
        [0x00, 0x00, _, _] => Ok(Endianness::Big),
        [0x00, 0x01, _, _] => Ok(Endianness::Little),
        [a, b, _, _] => Err(SerError::DecoderFailed {
            reason: format!("unsupported encapsulation {:02x}{:02x}", a, b),
        }),
        _ => Err(SerError::DecoderFailed {
            reason: "truncated encapsulation header".into(),
        }),
    }
}
