// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Default sertype/serdata for [`TopicType`] samples.
//!
//! Data is kept as little-endian CDR behind an encapsulation header; the key
//! is kept separately as big-endian CDR without a header.

use super::{
    assemble_fragments, mh3, FreeOp, Fragment, Keyhash, SerRef, Serdata, SerdataKind,
    SerdataRef, Sertype, SertypeRef, TopicType,
};
use crate::core::ser::{
    header_endianness, CdrWriter, Cursor, Endianness, SerError, SerResult, CDR_BE, CDR_LE,
    ENCAPSULATION_HEADER_SIZE,
};
use crate::dds::{Error, Result, Time};
use crate::logging::LogCategory;
use md5::{Digest, Md5};
use std::any::Any;
use std::fmt;
use std::io::IoSlice;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Sertype for a Rust [`TopicType`].
pub struct DefaultSertype<T: TopicType> {
    type_name: String,
    basehash: u32,
    me: Weak<DefaultSertype<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TopicType> DefaultSertype<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_name(T::type_name())
    }

    /// Same mapping registered under a different type name.
    #[must_use]
    pub fn with_name(type_name: &str) -> Arc<Self> {
        let type_name = type_name.to_string();
        let basehash = mh3(type_name.as_bytes(), 0);
        Arc::new_cyclic(|me| Self {
            type_name,
            basehash,
            me: me.clone(),
            _marker: PhantomData,
        })
    }

    /// Type-erased handle to a fresh sertype for `T`.
    #[must_use]
    pub fn new_ref() -> SertypeRef {
        Self::new()
    }

    fn key_of(sample: &T) -> SerResult<Vec<u8>> {
        let mut w = CdrWriter::new(Endianness::Big);
        sample.encode_key(&mut w)?;
        Ok(w.into_inner())
    }

    fn build(&self, kind: SerdataKind, key: Vec<u8>, ser: Vec<u8>) -> Arc<DefaultSerdata<T>> {
        Arc::new(DefaultSerdata {
            sertype: self.me.clone(),
            kind,
            hash: mh3(&key, self.basehash),
            key: key.into_boxed_slice(),
            ser: ser.into_boxed_slice(),
            timestamp: AtomicI64::new(0),
            statusinfo: AtomicU32::new(0),
            _marker: PhantomData,
        })
    }

    fn data_from_sample(&self, sample: &T) -> SerResult<Arc<DefaultSerdata<T>>> {
        let key = Self::key_of(sample)?;
        let mut w = CdrWriter::new(Endianness::Little);
        sample.encode(&mut w)?;
        let mut ser = Vec::with_capacity(ENCAPSULATION_HEADER_SIZE + w.offset());
        ser.extend_from_slice(&CDR_LE);
        ser.extend_from_slice(w.as_slice());
        Ok(self.build(SerdataKind::Data, key, ser))
    }

    fn key_from_sample(&self, sample: &T) -> SerResult<Arc<DefaultSerdata<T>>> {
        let key = Self::key_of(sample)?;
        let mut ser = Vec::with_capacity(ENCAPSULATION_HEADER_SIZE + key.len());
        ser.extend_from_slice(&CDR_BE);
        ser.extend_from_slice(&key);
        Ok(self.build(SerdataKind::Key, key, ser))
    }

    fn from_bytes(&self, kind: SerdataKind, bytes: &[u8]) -> SerResult<SerdataRef> {
        if bytes.len() < ENCAPSULATION_HEADER_SIZE {
            return Err(SerError::DecoderFailed {
                reason: "payload shorter than encapsulation header".into(),
            });
        }
        let (header, payload) = bytes.split_at(ENCAPSULATION_HEADER_SIZE);
        let endianness = header_endianness(header)?;
        let mut r = Cursor::new(payload, endianness);
        let serdata: SerdataRef = match kind {
            SerdataKind::Data => {
                let sample = T::decode(&mut r)?;
                self.data_from_sample(&sample)?
            }
            SerdataKind::Key => {
                let mut sample = T::default();
                sample.decode_key(&mut r)?;
                self.key_from_sample(&sample)?
            }
        };
        Ok(serdata)
    }

    fn key_fits_keyhash() -> bool {
        T::key_size_bound().is_some_and(|n| n <= 16)
    }
}

impl<T: TopicType> fmt::Debug for DefaultSertype<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSertype")
            .field("type_name", &self.type_name)
            .field("basehash", &format_args!("{:#010x}", self.basehash))
            .finish()
    }
}

impl<T: TopicType> Sertype for DefaultSertype<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn basehash(&self) -> u32 {
        self.basehash
    }

    fn has_key(&self) -> bool {
        T::has_key()
    }

    fn fixed_size(&self) -> bool {
        T::fixed_size()
    }

    fn equal(&self, other: &dyn Sertype) -> bool {
        other
            .as_any()
            .downcast_ref::<DefaultSertype<T>>()
            .is_some_and(|o| o.type_name == self.type_name)
    }

    fn hash(&self) -> u32 {
        mh3(self.type_name.as_bytes(), self.basehash)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn alloc_sample(&self) -> Box<dyn Any + Send> {
        Box::new(T::default())
    }

    fn zero_samples(&self, samples: &mut dyn Any, count: usize) {
        if let Some(v) = samples.downcast_mut::<Vec<T>>() {
            for s in v.iter_mut().take(count) {
                *s = T::default();
            }
        } else if let Some(s) = samples.downcast_mut::<T>() {
            *s = T::default();
        }
    }

    fn realloc_samples(
        &self,
        samples: Option<Box<dyn Any + Send>>,
        count: usize,
    ) -> Box<dyn Any + Send> {
        let mut v = match samples.map(|b| b.downcast::<Vec<T>>()) {
            Some(Ok(v)) => *v,
            _ => Vec::new(),
        };
        v.resize_with(count, T::default);
        Box::new(v)
    }

    fn free_samples(&self, samples: &mut dyn Any, count: usize, op: FreeOp) {
        match op {
            FreeOp::Contents => self.zero_samples(samples, count),
            FreeOp::All => {
                if let Some(v) = samples.downcast_mut::<Vec<T>>() {
                    v.clear();
                    v.shrink_to_fit();
                } else {
                    self.zero_samples(samples, count);
                }
            }
        }
    }

    fn from_ser(
        &self,
        kind: SerdataKind,
        fragments: &[Fragment<'_>],
        size: usize,
    ) -> SerResult<SerdataRef> {
        assemble_fragments(fragments, size)
            .and_then(|bytes| self.from_bytes(kind, &bytes))
            .map_err(|e| {
                crate::dds_log!(
                    LogCategory::WARNING,
                    "malformed {} sample dropped: {}",
                    self.type_name,
                    e
                );
                e
            })
    }

    fn from_ser_iov(
        &self,
        kind: SerdataKind,
        iov: &[IoSlice<'_>],
        size: usize,
    ) -> SerResult<SerdataRef> {
        let total: usize = iov.iter().map(|s| s.len()).sum();
        if total < size {
            return Err(SerError::InvalidData {
                reason: format!("iovec holds {} of {} bytes", total, size),
            });
        }
        let mut bytes = Vec::with_capacity(size);
        for slice in iov {
            let take = (size - bytes.len()).min(slice.len());
            bytes.extend_from_slice(&slice[..take]);
        }
        self.from_bytes(kind, &bytes)
    }

    fn from_keyhash(&self, keyhash: &Keyhash) -> Option<SerdataRef> {
        if !Self::key_fits_keyhash() {
            return None;
        }
        let mut sample = T::default();
        let mut r = Cursor::new(&keyhash.0, Endianness::Big);
        sample.decode_key(&mut r).ok()?;
        // Trailing bytes must be the zero padding of a short key.
        if keyhash.0[r.offset()..].iter().any(|b| *b != 0) {
            return None;
        }
        let serdata: SerdataRef = self.key_from_sample(&sample).ok()?;
        Some(serdata)
    }

    fn from_sample(&self, kind: SerdataKind, sample: &dyn Any) -> Result<SerdataRef> {
        let sample = sample
            .downcast_ref::<T>()
            .ok_or_else(|| Error::bad_param(format!("sample is not a {}", self.type_name)))?;
        if !sample.key_is_valid() {
            return Err(Error::bad_param("sample key is not valid"));
        }
        let serdata: SerdataRef = match kind {
            SerdataKind::Data => self.data_from_sample(sample)?,
            SerdataKind::Key => self.key_from_sample(sample)?,
        };
        Ok(serdata)
    }
}

/// One [`TopicType`] sample (or key) in CDR form.
pub struct DefaultSerdata<T: TopicType> {
    sertype: Weak<DefaultSertype<T>>,
    kind: SerdataKind,
    hash: u32,
    key: Box<[u8]>,
    /// Encapsulation header followed by the payload.
    ser: Box<[u8]>,
    timestamp: AtomicI64,
    statusinfo: AtomicU32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TopicType> DefaultSerdata<T> {
    fn payload(&self) -> SerResult<Cursor<'_>> {
        let (header, payload) = self.ser.split_at(ENCAPSULATION_HEADER_SIZE);
        Ok(Cursor::new(payload, header_endianness(header)?))
    }

    fn range(&self, offset: usize, size: usize) -> SerResult<std::ops::Range<usize>> {
        match offset.checked_add(size) {
            Some(end) if end <= self.ser.len() => Ok(offset..end),
            _ => Err(SerError::ReadFailed {
                offset,
                reason: format!("range of {} bytes exceeds {}", size, self.ser.len()),
            }),
        }
    }

    fn sample_mut<'a>(&self, sample: &'a mut dyn Any) -> Result<&'a mut T> {
        sample
            .downcast_mut::<T>()
            .ok_or_else(|| Error::bad_param(format!("sample is not a {}", T::type_name())))
    }
}

impl<T: TopicType> fmt::Debug for DefaultSerdata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSerdata")
            .field("kind", &self.kind)
            .field("hash", &format_args!("{:#010x}", self.hash))
            .field("size", &self.ser.len())
            .finish()
    }
}

impl<T: TopicType> Serdata for DefaultSerdata<T> {
    fn kind(&self) -> SerdataKind {
        self.kind
    }

    fn hash(&self) -> u32 {
        self.hash
    }

    fn sertype(&self) -> Option<SertypeRef> {
        let st: SertypeRef = self.sertype.upgrade()?;
        Some(st)
    }

    fn get_size(&self) -> usize {
        self.ser.len()
    }

    fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    fn to_ser(&self, offset: usize, buf: &mut [u8]) -> SerResult<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.ser[range]);
        Ok(())
    }

    fn to_ser_ref(&self, offset: usize, size: usize) -> SerResult<SerRef<'_>> {
        let range = self.range(offset, size)?;
        Ok(SerRef::new(&self.ser[range]))
    }

    fn to_sample(&self, sample: &mut dyn Any) -> Result<()> {
        let sample = self.sample_mut(sample)?;
        let mut r = self.payload()?;
        match self.kind {
            SerdataKind::Data => *sample = T::decode(&mut r)?,
            SerdataKind::Key => sample.decode_key(&mut r)?,
        }
        Ok(())
    }

    fn untyped_to_sample(&self, sample: &mut dyn Any) -> Result<()> {
        let sample = self.sample_mut(sample)?;
        let mut r = Cursor::new(&self.key, Endianness::Big);
        sample.decode_key(&mut r)?;
        Ok(())
    }

    fn to_untyped(&self) -> SerdataRef {
        let mut ser = Vec::with_capacity(ENCAPSULATION_HEADER_SIZE + self.key.len());
        ser.extend_from_slice(&CDR_BE);
        ser.extend_from_slice(&self.key);
        Arc::new(DefaultSerdata::<T> {
            sertype: self.sertype.clone(),
            kind: SerdataKind::Key,
            hash: self.hash,
            key: self.key.clone(),
            ser: ser.into_boxed_slice(),
            timestamp: AtomicI64::new(self.timestamp()),
            statusinfo: AtomicU32::new(self.statusinfo()),
            _marker: PhantomData,
        })
    }

    fn print(&self) -> String {
        let key: String = self.key.iter().map(|b| format!("{:02x}", b)).collect();
        let kind = match self.kind {
            SerdataKind::Key => "key",
            SerdataKind::Data => "data",
        };
        format!(
            "{}:{} key={} size={}",
            T::type_name(),
            kind,
            if key.is_empty() { "-" } else { &key },
            self.ser.len()
        )
    }

    fn get_keyhash(&self, force_md5: bool) -> Keyhash {
        let mut kh = [0u8; 16];
        if force_md5 || !DefaultSertype::<T>::key_fits_keyhash() || self.key.len() > 16 {
            kh.copy_from_slice(&Md5::digest(&self.key));
        } else {
            kh[..self.key.len()].copy_from_slice(&self.key);
        }
        Keyhash(kh)
    }

    fn timestamp(&self) -> Time {
        self.timestamp.load(Ordering::Relaxed)
    }

    fn set_timestamp(&self, ts: Time) {
        self.timestamp.store(ts, Ordering::Relaxed);
    }

    fn statusinfo(&self) -> u32 {
        self.statusinfo.load(Ordering::Relaxed)
    }

    fn set_statusinfo(&self, statusinfo: u32) {
        self.statusinfo.store(statusinfo, Ordering::Relaxed);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
