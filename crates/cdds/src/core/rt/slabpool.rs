// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Size-class slab pool backing pooled loan buffers.
//!
//! Slot reservation is a CAS on a per-class 64-bit bitmap. The slot's memory
//! is moved out to the borrower on reserve and moved back on release, so a
//! reserved buffer is exclusively owned without any shared mutable memory.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a reserved slot.
///
/// Encoded as: upper 16 bits = size class, lower 16 bits = slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlabHandle(pub u32);

impl SlabHandle {
    fn new(class: u16, slot: u16) -> Self {
        Self((u32::from(class) << 16) | u32::from(slot))
    }

    pub fn class(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn slot(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// (slot_size, slot_count) per class. Slot counts are at most 64 (bitmap width).
const SIZE_CLASSES: &[(usize, usize)] = &[
    (64, 64),
    (256, 64),
    (1024, 64),
    (4096, 32),
    (16384, 32),
    (65536, 16),
];

struct SizeClass {
    bitmap: AtomicU64,
    slot_size: usize,
    slot_count: usize,
    /// Memory of slots that are currently free; `None` until first use.
    slots: Vec<Mutex<Option<Box<[u8]>>>>,
}

impl SizeClass {
    fn new(slot_size: usize, slot_count: usize) -> Self {
        debug_assert!(slot_count <= 64);
        Self {
            bitmap: AtomicU64::new(0),
            slot_size,
            slot_count,
            slots: (0..slot_count).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn try_reserve(&self) -> Option<(u16, Box<[u8]>)> {
        loop {
            let bitmap = self.bitmap.load(Ordering::Acquire);
            let slot = (!bitmap).trailing_zeros() as usize;
            if slot >= self.slot_count {
                return None;
            }
            if self
                .bitmap
                .compare_exchange(
                    bitmap,
                    bitmap | (1u64 << slot),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                let buf = self.slots[slot]
                    .lock()
                    .take()
                    .unwrap_or_else(|| vec![0u8; self.slot_size].into_boxed_slice());
                return Some((slot as u16, buf));
            }
        }
    }

    fn release(&self, slot: u16, mut buf: Box<[u8]>) -> bool {
        let slot = usize::from(slot);
        if slot >= self.slot_count || buf.len() != self.slot_size {
            return false;
        }
        let mask = 1u64 << slot;
        if self.bitmap.load(Ordering::Acquire) & mask == 0 {
            return false;
        }
        buf.fill(0);
        *self.slots[slot].lock() = Some(buf);
        self.bitmap.fetch_and(!mask, Ordering::AcqRel);
        true
    }

    fn in_use(&self) -> usize {
        self.bitmap.load(Ordering::Acquire).count_ones() as usize
    }
}

/// Pool of fixed-size buffers in a handful of size classes.
pub struct SlabPool {
    classes: Vec<SizeClass>,
}

impl SlabPool {
    pub fn new() -> Self {
        Self {
            classes: SIZE_CLASSES
                .iter()
                .map(|&(size, count)| SizeClass::new(size, count))
                .collect(),
        }
    }

    /// Largest request the pool can serve.
    pub fn max_size(&self) -> usize {
        self.classes.last().map_or(0, |c| c.slot_size)
    }

    /// Reserve a buffer of at least `len` bytes.
    ///
    /// Starts at the smallest fitting class and falls back to larger ones.
    /// Returns `None` when every fitting class is exhausted.
    pub fn reserve(&self, len: usize) -> Option<(SlabHandle, Box<[u8]>)> {
        let start = self.classes.iter().position(|c| c.slot_size >= len)?;
        for (class, pool) in self.classes.iter().enumerate().skip(start) {
            if let Some((slot, buf)) = pool.try_reserve() {
                return Some((SlabHandle::new(class as u16, slot), buf));
            }
        }
        None
    }

    /// Give a reserved buffer back. Returns `false` (and drops the buffer) if
    /// the handle does not name a reserved slot of matching size.
    pub fn release(&self, handle: SlabHandle, buf: Box<[u8]>) -> bool {
        match self.classes.get(usize::from(handle.class())) {
            Some(class) => class.release(handle.slot(), buf),
            None => false,
        }
    }

    /// Number of reserved slots across all classes.
    pub fn in_use(&self) -> usize {
        self.classes.iter().map(SizeClass::in_use).sum()
    }
}

impl Default for SlabPool {
    fn default() -> Self {
        Self::new()
    }
}
