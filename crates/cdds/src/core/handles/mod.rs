// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide handle table.
//!
//! Maps small positive integers to reference-counted objects. A handle packs a
//! 7-bit kind tag and a 24-bit index into a positive `i32` (the sign bit stays
//! clear so negative values remain free for return codes):
//!
//! ```text
//!  31  30......24  23..................0
//! +---+----------+----------------------+
//! | 0 |   kind   |        index         |
//! +---+----------+----------------------+
//! ```
//!
//! The index is `generation * capacity + slot`, so a recycled slot produces a
//! different handle value and stale handles resolve to [`HandleError::Deleted`].
//!
//! Claims pin the object: `delete` closes the handle and then blocks on a
//! condition variable until every outstanding claim has been released or the
//! timeout expires.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bit position of the kind tag.
pub const HANDLE_KIND_SHIFT: u32 = 24;
/// Mask selecting the kind tag (7 bits).
pub const HANDLE_KIND_MASK: u32 = 0x7f << HANDLE_KIND_SHIFT;
/// Mask selecting the index (24 bits).
pub const HANDLE_INDEX_MASK: u32 = (1 << HANDLE_KIND_SHIFT) - 1;
/// Number of distinct index values.
const HANDLE_INDEX_SPACE: u32 = 1 << HANDLE_KIND_SHIFT;
/// Largest number of live slots a table may be configured with. Leaves every
/// slot at least 16 generations before a handle value repeats.
pub const HANDLE_MAX_CAPACITY: u32 = HANDLE_INDEX_SPACE >> 4;

/// Kind tag carried in the handle bits (1..=127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleKind(u8);

impl HandleKind {
    /// Returns `None` for 0 and for values that do not fit the 7-bit tag.
    #[must_use]
    pub const fn new(tag: u8) -> Option<Self> {
        if tag == 0 || tag > 0x7f {
            None
        } else {
            Some(Self(tag))
        }
    }

    #[must_use]
    pub const fn tag(self) -> u8 {
        self.0
    }
}

/// A 32-bit handle value as exchanged with applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i32);

impl Handle {
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Kind tag, or `None` for values that cannot be handles.
    #[must_use]
    pub fn kind(self) -> Option<HandleKind> {
        if self.0 <= 0 {
            return None;
        }
        HandleKind::new(((self.0 as u32 & HANDLE_KIND_MASK) >> HANDLE_KIND_SHIFT) as u8)
    }

    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32 & HANDLE_INDEX_MASK
    }

    fn compose(kind: HandleKind, index: u32) -> Self {
        debug_assert!(index <= HANDLE_INDEX_MASK);
        Self(((u32::from(kind.0) << HANDLE_KIND_SHIFT) | index) as i32)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failures of handle table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// Not a handle value this table could ever have produced.
    Invalid,
    /// Handle was deleted (slot free or reused by another handle).
    Deleted,
    /// Handle is closed: no new claims.
    Closed,
    /// Handle exists but has a different kind than requested.
    UnequalKind,
    /// Outstanding claims did not drain in time.
    Timeout,
    /// Table is full.
    OutOfResources,
}

impl std::fmt::Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HandleError::Invalid => "invalid handle",
            HandleError::Deleted => "handle deleted",
            HandleError::Closed => "handle closed",
            HandleError::UnequalKind => "handle kind mismatch",
            HandleError::Timeout => "timeout waiting for claims to drain",
            HandleError::OutOfResources => "handle table full",
        };
        f.write_str(s)
    }
}

impl std::error::Error for HandleError {}

struct Slot<T> {
    handle: Handle,
    generation: u32,
    value: Option<Arc<T>>,
    claims: u32,
    closed: bool,
}

struct TableInner<T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
}

/// Handle table holding `Arc<T>` values.
pub struct HandleTable<T> {
    inner: Mutex<TableInner<T>>,
    released: Condvar,
    capacity: u32,
    generations: u32,
}

impl<T> HandleTable<T> {
    /// Create a table with room for `capacity` live handles (clamped to
    /// `1..=HANDLE_MAX_CAPACITY`). Slots are allocated lazily.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.clamp(1, HANDLE_MAX_CAPACITY);
        Self {
            inner: Mutex::new(TableInner {
                slots: Vec::new(),
                free: VecDeque::new(),
            }),
            released: Condvar::new(),
            capacity,
            generations: HANDLE_INDEX_SPACE / capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of live (created, not yet deleted) handles.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.len() - inner.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `value` under a fresh handle of `kind`.
    pub fn create(&self, kind: HandleKind, value: T) -> Result<Handle, HandleError> {
        self.create_with(kind, |_| value)
    }

    /// Like [`create`](Self::create) but lets the value know its own handle.
    ///
    /// `make` runs with the table locked and must not call back into it.
    pub fn create_with(
        &self,
        kind: HandleKind,
        make: impl FnOnce(Handle) -> T,
    ) -> Result<Handle, HandleError> {
        let mut inner = self.inner.lock();
        let slot_index = match inner.free.pop_front() {
            Some(index) => index,
            None => {
                let next = inner.slots.len() as u32;
                if next >= self.capacity {
                    return Err(HandleError::OutOfResources);
                }
                inner.slots.push(Slot {
                    handle: Handle(0),
                    generation: 0,
                    value: None,
                    claims: 0,
                    closed: false,
                });
                next
            }
        };

        let slot = &mut inner.slots[slot_index as usize];
        if slot.handle.0 != 0 {
            slot.generation = (slot.generation + 1) % self.generations;
        }
        let handle = Handle::compose(kind, slot.generation * self.capacity + slot_index);
        slot.handle = handle;
        slot.value = Some(Arc::new(make(handle)));
        slot.claims = 0;
        slot.closed = false;
        Ok(handle)
    }

    fn slot_of<'a>(
        &self,
        inner: &'a mut TableInner<T>,
        handle: Handle,
    ) -> Result<&'a mut Slot<T>, HandleError> {
        if handle.kind().is_none() {
            return Err(HandleError::Invalid);
        }
        let slot_index = (handle.index() % self.capacity) as usize;
        let slot = inner
            .slots
            .get_mut(slot_index)
            .ok_or(HandleError::Invalid)?;
        if slot.handle != handle || slot.value.is_none() {
            return Err(HandleError::Deleted);
        }
        Ok(slot)
    }

    /// Pin the object behind `handle`, optionally checking its kind.
    ///
    /// Every successful claim must be balanced by one [`release`](Self::release).
    pub fn claim(&self, handle: Handle, kind: Option<HandleKind>) -> Result<Arc<T>, HandleError> {
        let mut inner = self.inner.lock();
        let slot = self.slot_of(&mut inner, handle)?;
        if let Some(expected) = kind {
            if handle.kind() != Some(expected) {
                return Err(HandleError::UnequalKind);
            }
        }
        if slot.closed {
            return Err(HandleError::Closed);
        }
        let value = slot.value.clone().ok_or(HandleError::Deleted)?;
        slot.claims += 1;
        Ok(value)
    }

    /// Drop one claim. Releasing an unclaimed handle is a caller bug.
    pub fn release(&self, handle: Handle) {
        let mut inner = self.inner.lock();
        match self.slot_of(&mut inner, handle) {
            Ok(slot) => {
                debug_assert!(slot.claims > 0, "release without claim on {}", handle);
                slot.claims = slot.claims.saturating_sub(1);
                if slot.claims == 0 {
                    self.released.notify_all();
                }
            }
            Err(err) => {
                debug_assert!(false, "release of {} failed: {}", handle, err);
            }
        }
    }

    /// Claim wrapped in a guard that releases on drop.
    pub fn pin(&self, handle: Handle, kind: Option<HandleKind>) -> Result<Pinned<'_, T>, HandleError> {
        let value = self.claim(handle, kind)?;
        Ok(Pinned {
            table: self,
            handle,
            value,
        })
    }

    /// Block new claims. Idempotent; outstanding claims are unaffected.
    pub fn close(&self, handle: Handle) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        let slot = self.slot_of(&mut inner, handle)?;
        slot.closed = true;
        Ok(())
    }

    /// Close the handle, wait for outstanding claims to drain, then free the
    /// slot and hand back the stored value.
    ///
    /// On timeout the handle stays closed and allocated.
    pub fn delete(&self, handle: Handle, timeout: Duration) -> Result<Arc<T>, HandleError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        self.slot_of(&mut inner, handle)?.closed = true;

        loop {
            let claims = self.slot_of(&mut inner, handle)?.claims;
            if claims == 0 {
                break;
            }
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut inner, deadline).timed_out()
                        && self.slot_of(&mut inner, handle)?.claims > 0
                    {
                        return Err(HandleError::Timeout);
                    }
                }
                None => self.released.wait(&mut inner),
            }
        }

        let slot_index = (handle.index() % self.capacity) as usize;
        let value = inner.slots[slot_index]
            .value
            .take()
            .ok_or(HandleError::Deleted)?;
        inner.free.push_back(slot_index as u32);
        Ok(value)
    }

    /// Health check without claiming.
    pub fn status(&self, handle: Handle, kind: Option<HandleKind>) -> Result<(), HandleError> {
        let mut inner = self.inner.lock();
        let slot = self.slot_of(&mut inner, handle)?;
        if let Some(expected) = kind {
            if handle.kind() != Some(expected) {
                return Err(HandleError::UnequalKind);
            }
        }
        if slot.closed {
            return Err(HandleError::Closed);
        }
        Ok(())
    }

    /// Snapshot of all live handles, optionally filtered by kind.
    #[must_use]
    pub fn handles(&self, kind: Option<HandleKind>) -> Vec<Handle> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter(|slot| slot.value.is_some() && !slot.closed)
            .map(|slot| slot.handle)
            .filter(|h| kind.is_none() || h.kind() == kind)
            .collect()
    }
}

/// RAII claim on a handle.
pub struct Pinned<'a, T> {
    table: &'a HandleTable<T>,
    handle: Handle,
    value: Arc<T>,
}

impl<T> Pinned<'_, T> {
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Shared reference to the value that outlives the pin.
    #[must_use]
    pub fn arc(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }
}

impl<T> std::ops::Deref for Pinned<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Pinned<'_, T> {
    fn drop(&mut self) {
        self.table.release(self.handle);
    }
}
