// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conditions: trigger predicates that waitsets block on.
//!
//! Every entity carries a [`StatusCondition`] whose trigger is "an enabled
//! status bit is set". Guard conditions are application-controlled; read and
//! query conditions live in [`super::read_condition`]. All of them keep weak
//! hooks to the waitsets they are attached to and signal those when their
//! trigger may have become true.

use super::entity::{self, EntityBody, EntityKind, NewEntity};
use super::{Entity, Error, Result};
use crate::core::rt::waitset::WaitsetSignal;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Condition trait - base interface for all conditions.
pub trait Condition: Send + Sync {
    /// Current trigger value.
    fn get_trigger_value(&self) -> bool;

    /// Unique identifier (for comparison).
    fn condition_id(&self) -> u64;

    /// Register a waitset signal so this condition can wake blocked waiters.
    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>);

    /// Remove a previously registered waitset signal.
    fn remove_waitset_signal(&self, signal_id: u64);

    fn as_any(&self) -> &dyn Any;
}

pub(crate) fn next_condition_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

struct WaitsetHook {
    id: u64,
    signal: Weak<dyn WaitsetSignal>,
}

/// Weak waitset hooks shared by all condition kinds.
#[derive(Default)]
pub(crate) struct WaitsetHooks {
    hooks: Mutex<Vec<WaitsetHook>>,
}

impl WaitsetHooks {
    pub(crate) fn attach(&self, signal: Arc<dyn WaitsetSignal>, triggered: bool) {
        let mut hooks = self.hooks.lock();
        hooks.retain(|hook| hook.signal.upgrade().is_some());
        hooks.push(WaitsetHook {
            id: signal.id(),
            signal: Arc::downgrade(&signal),
        });
        drop(hooks);
        if triggered {
            signal.signal();
        }
    }

    pub(crate) fn detach(&self, signal_id: u64) {
        self.hooks.lock().retain(|hook| hook.id != signal_id);
    }

    pub(crate) fn notify(&self) {
        self.hooks.lock().retain(|hook| {
            if let Some(signal) = hook.signal.upgrade() {
                signal.signal();
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.lock().len()
    }
}

/// Communication status bits; bit `n` is status id `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusMask(u32);

impl StatusMask {
    pub const NONE: StatusMask = StatusMask(0);

    pub const INCONSISTENT_TOPIC: StatusMask = StatusMask(1 << 0);
    pub const OFFERED_DEADLINE_MISSED: StatusMask = StatusMask(1 << 1);
    pub const REQUESTED_DEADLINE_MISSED: StatusMask = StatusMask(1 << 2);
    pub const OFFERED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 3);
    pub const REQUESTED_INCOMPATIBLE_QOS: StatusMask = StatusMask(1 << 4);
    pub const SAMPLE_LOST: StatusMask = StatusMask(1 << 5);
    pub const SAMPLE_REJECTED: StatusMask = StatusMask(1 << 6);
    pub const DATA_ON_READERS: StatusMask = StatusMask(1 << 7);
    pub const DATA_AVAILABLE: StatusMask = StatusMask(1 << 8);
    pub const LIVELINESS_LOST: StatusMask = StatusMask(1 << 9);
    pub const LIVELINESS_CHANGED: StatusMask = StatusMask(1 << 10);
    pub const PUBLICATION_MATCHED: StatusMask = StatusMask(1 << 11);
    pub const SUBSCRIPTION_MATCHED: StatusMask = StatusMask(1 << 12);

    /// Statuses a reader can raise.
    pub const READER: StatusMask = StatusMask(
        Self::SAMPLE_REJECTED.0
            | Self::LIVELINESS_CHANGED.0
            | Self::REQUESTED_DEADLINE_MISSED.0
            | Self::REQUESTED_INCOMPATIBLE_QOS.0
            | Self::DATA_AVAILABLE.0
            | Self::SAMPLE_LOST.0
            | Self::SUBSCRIPTION_MATCHED.0,
    );
    /// Statuses a writer can raise.
    pub const WRITER: StatusMask = StatusMask(
        Self::LIVELINESS_LOST.0
            | Self::OFFERED_DEADLINE_MISSED.0
            | Self::OFFERED_INCOMPATIBLE_QOS.0
            | Self::PUBLICATION_MATCHED.0,
    );
    pub const TOPIC: StatusMask = Self::INCONSISTENT_TOPIC;
    pub const SUBSCRIBER: StatusMask = Self::DATA_ON_READERS;

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        StatusMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: StatusMask) -> bool {
        (self.0 & other.0) == other.0
    }

    #[must_use]
    pub const fn intersects(&self, other: StatusMask) -> bool {
        (self.0 & other.0) != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Statuses valid for an entity of `kind`.
    #[must_use]
    pub const fn valid_for(kind: EntityKind) -> StatusMask {
        match kind {
            EntityKind::Reader => Self::READER,
            EntityKind::Writer => Self::WRITER,
            EntityKind::Topic => Self::TOPIC,
            EntityKind::Subscriber => Self::SUBSCRIBER,
            _ => Self::NONE,
        }
    }
}

impl std::ops::BitOr for StatusMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        StatusMask(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for StatusMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        StatusMask(self.0 & rhs.0)
    }
}

impl std::ops::Not for StatusMask {
    type Output = Self;
    fn not(self) -> Self {
        StatusMask(!self.0)
    }
}

/// StatusCondition - triggers while an enabled status bit is set.
///
/// The active bits are the entity's status; the enabled bits are its status
/// mask. Setting a bit only wakes waitsets when that bit is enabled.
pub struct StatusCondition {
    id: u64,
    enabled: AtomicU32,
    active: AtomicU32,
    hooks: WaitsetHooks,
}

impl StatusCondition {
    pub fn new(enabled: StatusMask) -> Self {
        Self {
            id: next_condition_id(),
            enabled: AtomicU32::new(enabled.bits()),
            active: AtomicU32::new(0),
            hooks: WaitsetHooks::default(),
        }
    }

    pub fn set_enabled_statuses(&self, mask: StatusMask) {
        self.enabled.store(mask.bits(), Ordering::Release);
        if self.get_trigger_value() {
            self.hooks.notify();
        }
    }

    pub fn get_enabled_statuses(&self) -> StatusMask {
        StatusMask(self.enabled.load(Ordering::Acquire))
    }

    pub fn get_active_statuses(&self) -> StatusMask {
        StatusMask(self.active.load(Ordering::Acquire))
    }

    /// Raise status bits.
    pub(crate) fn set(&self, mask: StatusMask) {
        let old = self.active.fetch_or(mask.bits(), Ordering::AcqRel);
        let fresh = mask.bits() & !old;
        if fresh & self.enabled.load(Ordering::Acquire) != 0 {
            self.hooks.notify();
        }
    }

    /// Clear status bits.
    pub(crate) fn reset(&self, mask: StatusMask) {
        self.active.fetch_and(!mask.bits(), Ordering::AcqRel);
    }

    /// Clear and return the bits of `mask` that were set.
    pub(crate) fn take(&self, mask: StatusMask) -> StatusMask {
        StatusMask(self.active.fetch_and(!mask.bits(), Ordering::AcqRel) & mask.bits())
    }
}

impl Condition for StatusCondition {
    fn get_trigger_value(&self) -> bool {
        self.get_enabled_statuses()
            .intersects(self.get_active_statuses())
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        log::debug!(
            "[condition] status condition {} attach signal {}",
            self.id,
            signal.id()
        );
        self.hooks.attach(signal, self.get_trigger_value());
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.detach(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// GuardCondition - manually-triggered condition.
pub struct GuardCondition {
    id: u64,
    trigger_value: AtomicBool,
    hooks: WaitsetHooks,
}

impl GuardCondition {
    pub fn new() -> Self {
        Self {
            id: next_condition_id(),
            trigger_value: AtomicBool::new(false),
            hooks: WaitsetHooks::default(),
        }
    }

    /// Set the trigger; `true` wakes every waitset it is attached to.
    pub fn set_trigger_value(&self, value: bool) {
        self.trigger_value.store(value, Ordering::Release);
        if value {
            self.hooks.notify();
        }
    }

    /// Read and reset the trigger.
    pub fn take_trigger_value(&self) -> bool {
        self.trigger_value.swap(false, Ordering::AcqRel)
    }
}

impl Condition for GuardCondition {
    fn get_trigger_value(&self) -> bool {
        self.trigger_value.load(Ordering::Acquire)
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitsetSignal>) {
        self.hooks.attach(signal, self.get_trigger_value());
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.hooks.detach(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Default for GuardCondition {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Guard condition entity API
// ============================================================================

/// Create a guard condition owned by `participant`.
pub fn create_guardcondition(participant: Entity) -> Result<Entity> {
    let parent = entity::pin(participant)?;
    if parent.kind != EntityKind::Participant {
        return Err(Error::IllegalOperation);
    }
    let guard = Arc::new(GuardCondition::new());
    entity::create_entity(
        NewEntity::child(EntityKind::GuardCondition, &parent.arc()),
        |_| EntityBody::Guard(guard),
    )
}

fn guard_of(cond: Entity) -> Result<Arc<GuardCondition>> {
    let node = entity::pin_kind(cond, EntityKind::GuardCondition)?;
    match &node.body {
        EntityBody::Guard(guard) => Ok(Arc::clone(guard)),
        _ => Err(Error::IllegalOperation),
    }
}

pub fn set_guardcondition(cond: Entity, triggered: bool) -> Result<()> {
    guard_of(cond)?.set_trigger_value(triggered);
    Ok(())
}

pub fn read_guardcondition(cond: Entity) -> Result<bool> {
    Ok(guard_of(cond)?.get_trigger_value())
}

pub fn take_guardcondition(cond: Entity) -> Result<bool> {
    Ok(guard_of(cond)?.take_trigger_value())
}

#[cfg(test)]
mod tests;
