// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type identifiers and member name hashes.
//!
//! A registered type is identified by the first 14 bytes of the MD5 digest
//! of its canonical serialization (the XTypes equivalence hash layout), so
//! two independently built but identical definitions get the same id.

use md5::{Digest, Md5};
use std::fmt;

/// The 4 most significant bits of a member id are reserved.
pub const MEMBER_ID_MASK: u32 = 0x0fff_ffff;

/// 14-byte hash identifying a registered dynamic type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId([u8; 14]);

impl TypeId {
    pub(crate) fn compute(canonical: &[u8]) -> Self {
        let digest = Md5::digest(canonical);
        let mut bytes = [0u8; 14];
        bytes.copy_from_slice(&digest[..14]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 14] {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self)
    }
}

/// Member id derived from a member name: the first four bytes of its MD5
/// digest, little-endian, masked to the valid id range.
pub fn member_hashid(name: &str) -> u32 {
    let digest = Md5::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) & MEMBER_ID_MASK
}
