// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waitset driver: slot registration plus a condvar-backed wake-up.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Default maximum number of slots per driver.
pub const WAITSET_DEFAULT_MAX_SLOTS: usize = 2048;

/// Errors returned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitsetError {
    /// Deadline passed without a wake-up.
    Timeout,
    /// Driver was closed (its waitset is being deleted).
    Closed,
    /// No free slot left.
    CapacityExceeded(usize),
}

impl std::fmt::Display for WaitsetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitsetError::Timeout => write!(f, "waitset wait timed out"),
            WaitsetError::Closed => write!(f, "waitset closed"),
            WaitsetError::CapacityExceeded(max) => {
                write!(f, "waitset capacity exceeded (max {})", max)
            }
        }
    }
}

impl std::error::Error for WaitsetError {}

/// Handle given to a condition for one attachment.
///
/// Conditions keep it weakly and call `signal()` when their trigger value may
/// have become true; `id()` identifies the attachment for detaching.
pub trait WaitsetSignal: Send + Sync {
    fn signal(&self);

    fn id(&self) -> u64;
}

/// Shared driver; clones refer to the same wait state.
#[derive(Clone)]
pub struct WaitsetDriver {
    inner: Arc<DriverInner>,
}

impl WaitsetDriver {
    pub fn new(max_slots: usize) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            inner: Arc::new(DriverInner {
                state: Mutex::new(DriverState {
                    signalled: Vec::new(),
                    pending: false,
                    closed: false,
                }),
                wake: Condvar::new(),
                slots: Mutex::new(SlotTable::new()),
                max_slots,
            }),
        }
    }

    pub fn register_slot(&self) -> Result<WaitsetRegistration, WaitsetError> {
        self.inner.register_slot()
    }

    /// Returns `true` if the slot was registered under `slot_id`.
    pub fn unregister_slot(&self, slot_index: usize, slot_id: u64) -> bool {
        self.inner.slots.lock().release_slot(slot_index, slot_id)
    }

    /// Block until woken, `deadline` passes (`None` waits forever) or the
    /// driver is closed. Returns the slots signalled since the last wake-up.
    pub fn wait(&self, deadline: Option<Instant>) -> Result<Vec<usize>, WaitsetError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        loop {
            if state.closed {
                return Err(WaitsetError::Closed);
            }
            if state.pending {
                state.pending = false;
                return Ok(std::mem::take(&mut state.signalled));
            }
            match deadline {
                Some(deadline) => {
                    if inner.wake.wait_until(&mut state, deadline).timed_out()
                        && !state.pending
                        && !state.closed
                    {
                        return Err(WaitsetError::Timeout);
                    }
                }
                None => inner.wake.wait(&mut state),
            }
        }
    }

    /// Wake the waiter without marking any slot.
    pub fn manual_notify(&self) {
        self.inner.wake_up(None);
    }

    /// Fail the current and all future waits with [`WaitsetError::Closed`].
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        self.inner.wake.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

struct DriverState {
    signalled: Vec<usize>,
    pending: bool,
    closed: bool,
}

struct DriverInner {
    state: Mutex<DriverState>,
    wake: Condvar,
    slots: Mutex<SlotTable>,
    max_slots: usize,
}

impl DriverInner {
    fn register_slot(self: &Arc<Self>) -> Result<WaitsetRegistration, WaitsetError> {
        let (slot_index, slot_id) = self.slots.lock().allocate_slot(self.max_slots)?;
        let signal = Arc::new(SignalHandle {
            inner: Arc::downgrade(self),
            slot_index,
            slot_id,
        });
        Ok(WaitsetRegistration {
            slot_index,
            slot_id,
            signal,
        })
    }

    fn wake_up(&self, slot_index: Option<usize>) {
        let mut state = self.state.lock();
        if let Some(index) = slot_index {
            if !state.signalled.contains(&index) {
                state.signalled.push(index);
            }
        }
        state.pending = true;
        self.wake.notify_all();
    }
}

/// Registration returned by [`WaitsetDriver::register_slot`].
pub struct WaitsetRegistration {
    slot_index: usize,
    slot_id: u64,
    signal: Arc<SignalHandle>,
}

impl WaitsetRegistration {
    /// Erase the concrete type so callers can store `Arc<dyn WaitsetSignal>`.
    pub fn into_trait(self) -> (usize, u64, Arc<dyn WaitsetSignal>) {
        (self.slot_index, self.slot_id, self.signal)
    }
}

struct SignalHandle {
    inner: Weak<DriverInner>,
    slot_index: usize,
    slot_id: u64,
}

impl WaitsetSignal for SignalHandle {
    fn signal(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.wake_up(Some(self.slot_index));
        }
    }

    fn id(&self) -> u64 {
        self.slot_id
    }
}

struct SlotTable {
    entries: Vec<Option<u64>>,
    free: Vec<usize>,
    next_id: u64,
}

impl SlotTable {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            next_id: 1,
        }
    }

    fn allocate_slot(&mut self, max_slots: usize) -> Result<(usize, u64), WaitsetError> {
        let slot_index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.entries.len();
                if index >= max_slots {
                    return Err(WaitsetError::CapacityExceeded(max_slots));
                }
                self.entries.push(None);
                index
            }
        };
        let slot_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.entries[slot_index] = Some(slot_id);
        Ok((slot_index, slot_id))
    }

    fn release_slot(&mut self, slot_index: usize, slot_id: u64) -> bool {
        match self.entries.get_mut(slot_index) {
            Some(entry) if *entry == Some(slot_id) => {
                *entry = None;
                self.free.push(slot_index);
                true
            }
            _ => false,
        }
    }

    fn live(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

#[cfg(test)]
pub(super) mod internal {
    use super::*;

    pub(crate) fn live_slots(driver: &WaitsetDriver) -> usize {
        driver.inner.slots.lock().live()
    }
}
