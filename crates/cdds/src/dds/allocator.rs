// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data allocators for loaned buffers.
//!
//! A [`DataAllocator`] hands out [`LoanBuffer`]s from one of two backends:
//!
//! - **heap**: plain boxed memory; available to anyone through
//!   [`DataAllocator::init_heap`].
//! - **pool**: slots of the process-wide slab pool. Readers and writers get
//!   this backend when `loan_pool_enabled` is set in the runtime config.
//!
//! Each buffer remembers the allocator instance it came from; `free` refuses
//! buffers of any other instance and leaves them with the caller.

use super::entity::{self, EntityKind};
use super::{Entity, Error, Result};
use crate::config::RuntimeConfig;
use crate::core::rt::{get_slab_pool, SlabHandle, SlabPool};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

enum Backend {
    Heap,
    Pool(Arc<SlabPool>),
}

/// Allocator of loan buffers bound to one backend.
pub struct DataAllocator {
    id: u64,
    backend: Backend,
}

/// Buffer obtained from a [`DataAllocator`].
///
/// Dropping a pooled buffer gives its slot back to the pool.
pub struct LoanBuffer {
    owner: u64,
    len: usize,
    data: Box<[u8]>,
    slot: Option<(Arc<SlabPool>, SlabHandle)>,
}

fn next_allocator_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

impl DataAllocator {
    /// Allocator for a reader's or writer's loans.
    pub fn init(entity: Entity) -> Result<Self> {
        let node = entity::pin(entity)?;
        match node.kind {
            EntityKind::Reader | EntityKind::Writer => Ok(Self::for_endpoint()),
            _ => Err(Error::IllegalOperation),
        }
    }

    /// Heap allocator, usable without any entity.
    pub fn init_heap() -> Self {
        Self {
            id: next_allocator_id(),
            backend: Backend::Heap,
        }
    }

    pub(crate) fn for_endpoint() -> Self {
        if RuntimeConfig::global().core().loan_pool_enabled {
            Self {
                id: next_allocator_id(),
                backend: Backend::Pool(get_slab_pool()),
            }
        } else {
            Self::init_heap()
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.backend, Backend::Pool(_))
    }

    /// Allocate `size` bytes, zero-filled.
    pub fn alloc(&self, size: usize) -> Result<LoanBuffer> {
        match &self.backend {
            Backend::Heap => Ok(LoanBuffer {
                owner: self.id,
                len: size,
                data: vec![0u8; size].into_boxed_slice(),
                slot: None,
            }),
            Backend::Pool(pool) => {
                let Some((handle, mut data)) = pool.reserve(size) else {
                    log::debug!(
                        "[allocator] pool cannot serve {} bytes ({} slots in use)",
                        size,
                        pool.in_use()
                    );
                    return Err(Error::OutOfResources);
                };
                data[..size].fill(0);
                Ok(LoanBuffer {
                    owner: self.id,
                    len: size,
                    data,
                    slot: Some((Arc::clone(pool), handle)),
                })
            }
        }
    }

    /// Free a buffer of this allocator. `None` is a no-op.
    ///
    /// A buffer from another allocator is refused with BAD_PARAMETER and
    /// left in `buf`.
    pub fn free(&self, buf: &mut Option<LoanBuffer>) -> Result<()> {
        match buf {
            None => Ok(()),
            Some(b) if b.owner != self.id => Err(Error::bad_param(
                "buffer belongs to another allocator",
            )),
            Some(_) => {
                drop(buf.take());
                Ok(())
            }
        }
    }

    /// Release the allocator. Buffers still out stay valid until dropped.
    pub fn fini(self) -> Result<()> {
        log::trace!("[allocator] fini {}", self.id);
        Ok(())
    }
}

impl fmt::Debug for DataAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataAllocator")
            .field("id", &self.id)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl LoanBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for LoanBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl DerefMut for LoanBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl Drop for LoanBuffer {
    fn drop(&mut self) {
        if let Some((pool, handle)) = self.slot.take() {
            let data = std::mem::take(&mut self.data);
            if !pool.release(handle, data) {
                log::warn!("[allocator] slot {:?} was not reserved", handle);
            }
        }
    }
}

impl fmt::Debug for LoanBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoanBuffer")
            .field("len", &self.len)
            .field("pooled", &self.slot.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_alloc_is_zeroed() {
        let alloc = DataAllocator::init_heap();
        let mut buf = alloc.alloc(32).expect("heap alloc");
        assert_eq!(buf.len(), 32);
        assert!(buf.iter().all(|b| *b == 0));
        buf[0] = 7;
        assert_eq!(buf[0], 7);
        alloc.free(&mut Some(buf)).expect("free");
    }

    #[test]
    fn test_free_none_is_noop() {
        let alloc = DataAllocator::init_heap();
        alloc.free(&mut None).expect("free none");
    }

    #[test]
    fn test_free_foreign_buffer_is_refused() {
        let a = DataAllocator::init_heap();
        let b = DataAllocator::init_heap();
        let mut buf = Some(a.alloc(8).expect("alloc"));
        let err = b.free(&mut buf).expect_err("foreign buffer");
        assert!(matches!(err, Error::BadParameter(_)));
        assert!(buf.is_some(), "refused buffer stays with the caller");
        a.free(&mut buf).expect("owner frees");
        assert!(buf.is_none());
    }

    #[test]
    fn test_pool_slot_returns_on_drop() {
        let pool = Arc::new(SlabPool::new());
        let alloc = DataAllocator {
            id: next_allocator_id(),
            backend: Backend::Pool(Arc::clone(&pool)),
        };
        let buf = alloc.alloc(100).expect("pool alloc");
        assert_eq!(buf.len(), 100);
        assert_eq!(pool.in_use(), 1);
        drop(buf);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_pool_rejects_oversized() {
        let pool = Arc::new(SlabPool::new());
        let alloc = DataAllocator {
            id: next_allocator_id(),
            backend: Backend::Pool(Arc::clone(&pool)),
        };
        let err = alloc.alloc(pool.max_size() + 1).expect_err("too large");
        assert!(matches!(err, Error::OutOfResources));
    }
}
