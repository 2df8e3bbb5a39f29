// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serialized data abstraction.
//!
//! A [`Sertype`] describes a topic's data type and builds [`Serdata`]
//! objects, each of which is one sample (or just its key) in some
//! representation. The history cache, the write path and instance lookup only
//! ever see these two traits; the concrete sample type stays behind
//! `dyn Any`.
//!
//! Serdata lifetime is plain `Arc` reference counting ([`SerdataRef`]): a
//! clone is a `ref`, a drop is an `unref`, and the last drop frees it on
//! whichever thread that happens.

mod default;

pub use default::{DefaultSerdata, DefaultSertype};

use crate::core::ser::{CdrWriter, Cursor, SerError, SerResult};
use crate::dds::{Result, Time};
use std::any::Any;
use std::fmt;
use std::io::IoSlice;
use std::sync::Arc;

/// Shared, reference-counted serdata.
pub type SerdataRef = Arc<dyn Serdata>;
/// Shared, reference-counted sertype.
pub type SertypeRef = Arc<dyn Sertype>;

/// Status info bit: the sample disposes its instance.
pub const STATUSINFO_DISPOSE: u32 = 1;
/// Status info bit: the sample unregisters its writer from the instance.
pub const STATUSINFO_UNREGISTER: u32 = 2;

/// What a serdata carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdataKind {
    /// Key fields only ("topicless" form).
    Key,
    /// A complete sample.
    Data,
}

/// 16-byte key hash as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Keyhash(pub [u8; 16]);

/// One piece of a received (possibly fragmented) payload.
///
/// Fragments are given in increasing `offset` order and may overlap; bytes
/// already covered by an earlier fragment are skipped.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub offset: usize,
    pub bytes: &'a [u8],
}

/// Borrowed view of a serdata's wire representation.
#[derive(Debug)]
pub struct SerRef<'a> {
    bytes: &'a [u8],
}

impl<'a> SerRef<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl std::ops::Deref for SerRef<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

/// How much of a sample array [`Sertype::free_samples`] releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOp {
    /// Reset the contents, keep the array.
    Contents,
    /// Release the array as well.
    All,
}

/// Type descriptor shared by all serdata of one topic type.
pub trait Sertype: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// Type-independent seed mixed into every key hash of this type.
    fn basehash(&self) -> u32;

    fn has_key(&self) -> bool;

    fn fixed_size(&self) -> bool;

    /// Whether `other` describes the same type.
    fn equal(&self, other: &dyn Sertype) -> bool;

    fn hash(&self) -> u32;

    fn as_any(&self) -> &dyn Any;

    /// One default-initialized sample.
    fn alloc_sample(&self) -> Box<dyn Any + Send>;

    /// Reset the first `count` samples of an array to their default value.
    fn zero_samples(&self, samples: &mut dyn Any, count: usize);

    /// Resize (or create) a sample array to `count` elements.
    fn realloc_samples(&self, samples: Option<Box<dyn Any + Send>>, count: usize)
        -> Box<dyn Any + Send>;

    fn free_samples(&self, samples: &mut dyn Any, count: usize, op: FreeOp);

    /// Build from a received fragment chain covering `size` bytes.
    fn from_ser(&self, kind: SerdataKind, fragments: &[Fragment<'_>], size: usize)
        -> SerResult<SerdataRef>;

    /// Build from contiguous I/O vectors totalling `size` bytes.
    fn from_ser_iov(&self, kind: SerdataKind, iov: &[IoSlice<'_>], size: usize)
        -> SerResult<SerdataRef>;

    /// Key-only serdata recovered from a key hash, `None` when the key
    /// cannot be recovered losslessly.
    fn from_keyhash(&self, keyhash: &Keyhash) -> Option<SerdataRef>;

    /// Build from an application sample. Rejects samples of another type and
    /// samples whose key is not valid.
    fn from_sample(&self, kind: SerdataKind, sample: &dyn Any) -> Result<SerdataRef>;
}

/// One sample in some representation.
pub trait Serdata: Send + Sync + fmt::Debug {
    fn kind(&self) -> SerdataKind;

    /// Key hash seeded with the sertype's base hash.
    fn hash(&self) -> u32;

    fn sertype(&self) -> Option<SertypeRef>;

    /// Size of the wire representation including the encapsulation header.
    fn get_size(&self) -> usize;

    /// Serialized key, big-endian, used for key comparison.
    fn key_bytes(&self) -> &[u8];

    fn eqkey(&self, other: &dyn Serdata) -> bool {
        self.key_bytes() == other.key_bytes()
    }

    /// Copy `buf.len()` bytes of the wire representation starting at `offset`.
    fn to_ser(&self, offset: usize, buf: &mut [u8]) -> SerResult<()>;

    /// Borrow `size` bytes of the wire representation starting at `offset`.
    fn to_ser_ref(&self, offset: usize, size: usize) -> SerResult<SerRef<'_>>;

    /// End a borrow obtained from [`to_ser_ref`](Self::to_ser_ref).
    fn to_ser_unref(&self, serref: SerRef<'_>) {
        drop(serref);
    }

    /// Fill an application sample. A key serdata only touches key fields.
    fn to_sample(&self, sample: &mut dyn Any) -> Result<()>;

    /// Fill only the key fields of an application sample.
    fn untyped_to_sample(&self, sample: &mut dyn Any) -> Result<()>;

    /// Key-only copy with identical key bytes and hash.
    fn to_untyped(&self) -> SerdataRef;

    fn print(&self) -> String;

    fn get_keyhash(&self, force_md5: bool) -> Keyhash;

    fn timestamp(&self) -> Time;

    fn set_timestamp(&self, ts: Time);

    fn statusinfo(&self) -> u32;

    fn set_statusinfo(&self, statusinfo: u32);

    fn as_any(&self) -> &dyn Any;
}

/// Application sample type with a CDR mapping.
///
/// Keys are encoded big-endian by [`encode_key`](Self::encode_key); that form
/// decides instance identity and the key hash.
pub trait TopicType: Default + Clone + Send + Sync + 'static {
    fn type_name() -> &'static str;

    fn has_key() -> bool {
        false
    }

    /// Upper bound on the serialized key size, `None` if unbounded.
    fn key_size_bound() -> Option<usize> {
        if Self::has_key() {
            None
        } else {
            Some(0)
        }
    }

    fn fixed_size() -> bool {
        false
    }

    fn encode(&self, w: &mut CdrWriter) -> SerResult<()>;

    fn decode(r: &mut Cursor<'_>) -> SerResult<Self>;

    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        let _ = w;
        Ok(())
    }

    /// Overwrite the key fields of `self`, leaving other fields untouched.
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        let _ = r;
        Ok(())
    }

    /// Reject samples whose key fields are not usable.
    fn key_is_valid(&self) -> bool {
        true
    }
}

/// MurmurHash3 (x86, 32-bit).
#[must_use]
pub fn mh3(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, b) in tail.iter().enumerate() {
            k1 ^= u32::from(*b) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

/// Concatenate a fragment chain into exactly `size` bytes.
///
/// `size` comes off the wire: it is checked against what the fragments
/// cover before anything is reserved.
pub(crate) fn assemble_fragments(fragments: &[Fragment<'_>], size: usize) -> SerResult<Vec<u8>> {
    let mut covered = 0usize;
    for frag in fragments {
        let end = frag
            .offset
            .checked_add(frag.bytes.len())
            .ok_or_else(|| SerError::InvalidData {
                reason: format!("fragment at {} overflows", frag.offset),
            })?;
        covered = covered.max(end);
    }
    if covered < size {
        return Err(SerError::InvalidData {
            reason: format!("fragment chain covers {} of {} bytes", covered, size),
        });
    }
    let mut buf = Vec::with_capacity(size);
    for frag in fragments {
        if frag.offset > buf.len() {
            return Err(SerError::InvalidData {
                reason: format!("gap in fragment chain at {}", buf.len()),
            });
        }
        let end = (frag.offset + frag.bytes.len()).min(size);
        if end > buf.len() {
            buf.extend_from_slice(&frag.bytes[buf.len() - frag.offset..end - frag.offset]);
        }
    }
    if buf.len() != size {
        return Err(SerError::InvalidData {
            reason: format!("fragment chain covers {} of {} bytes", buf.len(), size),
        });
    }
    Ok(buf)
}

#[cfg(test)]
mod tests;
