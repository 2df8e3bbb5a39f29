// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read and query conditions.
//!
//! A read condition is attached to one reader and triggers while the
//! reader's history cache holds a sample matching its state mask. A query
//! condition additionally requires a content filter to accept the sample.
//! Both can stand in for the reader in every read/take call, in which case
//! their mask narrows what the call returns.

use super::condition::{next_condition_id, Condition, WaitsetHooks};
use super::entity::{self, EntityBody, EntityKind, NewEntity};
use super::{Entity, Error, Result};
use crate::core::rt::waitset::WaitsetSignal;
use crate::core::serdata::TopicType;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sample state selection bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleStateMask(u32);

impl SampleStateMask {
    pub const READ: SampleStateMask = SampleStateMask(1);
    pub const NOT_READ: SampleStateMask = SampleStateMask(2);
    pub const ANY: SampleStateMask = SampleStateMask(Self::READ.0 | Self::NOT_READ.0);

    pub const fn from_bits(bits: u32) -> Self {
        SampleStateMask(bits & Self::ANY.0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// View state selection bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewStateMask(u32);

impl ViewStateMask {
    pub const NEW: ViewStateMask = ViewStateMask(4);
    pub const NOT_NEW: ViewStateMask = ViewStateMask(8);
    pub const ANY: ViewStateMask = ViewStateMask(Self::NEW.0 | Self::NOT_NEW.0);

    pub const fn from_bits(bits: u32) -> Self {
        ViewStateMask(bits & Self::ANY.0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// Instance state selection bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceStateMask(u32);

impl InstanceStateMask {
    pub const ALIVE: InstanceStateMask = InstanceStateMask(16);
    pub const NOT_ALIVE_DISPOSED: InstanceStateMask = InstanceStateMask(32);
    pub const NOT_ALIVE_NO_WRITERS: InstanceStateMask = InstanceStateMask(64);
    pub const NOT_ALIVE: InstanceStateMask =
        InstanceStateMask(Self::NOT_ALIVE_DISPOSED.0 | Self::NOT_ALIVE_NO_WRITERS.0);
    pub const ANY: InstanceStateMask = InstanceStateMask(Self::ALIVE.0 | Self::NOT_ALIVE.0);

    pub const fn from_bits(bits: u32) -> Self {
        InstanceStateMask(bits & Self::ANY.0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

macro_rules! mask_bitor {
    ($($ty:ident),*) => {
        $(impl std::ops::BitOr for $ty {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $ty(self.0 | rhs.0)
            }
        }

        impl $ty {
            /// All bits of `other` are set in `self`.
            pub const fn contains(&self, other: $ty) -> bool {
                (self.0 & other.0) == other.0
            }
        })*
    };
}
mask_bitor!(SampleStateMask, ViewStateMask, InstanceStateMask, ReadMask);

/// Combined sample/view/instance state selection.
///
/// A group with no bits set selects every state of that group, so
/// [`ReadMask::ANY`] (all zero) reads everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReadMask(u32);

impl ReadMask {
    pub const ANY: ReadMask = ReadMask(0);

    pub const READ: ReadMask = ReadMask(SampleStateMask::READ.0);
    pub const NOT_READ: ReadMask = ReadMask(SampleStateMask::NOT_READ.0);
    pub const NEW: ReadMask = ReadMask(ViewStateMask::NEW.0);
    pub const NOT_NEW: ReadMask = ReadMask(ViewStateMask::NOT_NEW.0);
    pub const ALIVE: ReadMask = ReadMask(InstanceStateMask::ALIVE.0);
    pub const NOT_ALIVE_DISPOSED: ReadMask = ReadMask(InstanceStateMask::NOT_ALIVE_DISPOSED.0);
    pub const NOT_ALIVE_NO_WRITERS: ReadMask =
        ReadMask(InstanceStateMask::NOT_ALIVE_NO_WRITERS.0);

    pub const ANY_SAMPLE_STATE: ReadMask = ReadMask(SampleStateMask::ANY.0);
    pub const ANY_VIEW_STATE: ReadMask = ReadMask(ViewStateMask::ANY.0);
    pub const ANY_INSTANCE_STATE: ReadMask = ReadMask(InstanceStateMask::ANY.0);
    /// Every defined bit.
    pub const ALL_STATES: ReadMask = ReadMask(
        Self::ANY_SAMPLE_STATE.0 | Self::ANY_VIEW_STATE.0 | Self::ANY_INSTANCE_STATE.0,
    );

    pub const fn new(
        sample: SampleStateMask,
        view: ViewStateMask,
        instance: InstanceStateMask,
    ) -> Self {
        ReadMask(sample.0 | view.0 | instance.0)
    }

    /// Raw bits; undefined bits are rejected by the operations taking a mask.
    pub const fn from_bits(bits: u32) -> Self {
        ReadMask(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn sample_states(&self) -> SampleStateMask {
        SampleStateMask::from_bits(self.0)
    }

    pub const fn view_states(&self) -> ViewStateMask {
        ViewStateMask::from_bits(self.0)
    }

    pub const fn instance_states(&self) -> InstanceStateMask {
        InstanceStateMask::from_bits(self.0)
    }

    pub(crate) fn validate(self) -> Result<Self> {
        if self.0 & !Self::ALL_STATES.0 != 0 {
            return Err(Error::bad_param(format!("invalid read mask {:#x}", self.0)));
        }
        Ok(self)
    }

    /// States excluded by this mask. A state `s` is selected iff `s & excluded() == 0`.
    pub(crate) const fn excluded(&self) -> u32 {
        const fn group(bits: u32, any: u32) -> u32 {
            if bits & any == 0 {
                0
            } else {
                any & !bits
            }
        }
        group(self.0, SampleStateMask::ANY.0)
            | group(self.0, ViewStateMask::ANY.0)
            | group(self.0, InstanceStateMask::ANY.0)
    }
}

impl From<SampleStateMask> for ReadMask {
    fn from(m: SampleStateMask) -> Self {
        ReadMask(m.0)
    }
}

impl From<ViewStateMask> for ReadMask {
    fn from(m: ViewStateMask) -> Self {
        ReadMask(m.0)
    }
}

impl From<InstanceStateMask> for ReadMask {
    fn from(m: InstanceStateMask) -> Self {
        ReadMask(m.0)
    }
}

/// Type-erased content filter of a query condition.
pub(crate) type SampleFilter = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

pub(crate) struct QueryFilter {
    /// Single bit identifying this query in per-sample match sets.
    pub(crate) bit: u64,
    pub(crate) filter: SampleFilter,
}

/// Read or query condition attached to a reader.
pub struct ReadCondition {
    id: u64,
    reader: Entity,
    mask: ReadMask,
    query: Option<QueryFilter>,
    trigger_value: AtomicBool,
    hooks: WaitsetHooks,
}

impl ReadCondition {
    pub(crate) fn new(reader: Entity, mask: ReadMask, query: Option<QueryFilter>) -> Self {
        Self {
            id: next_condition_id(),
            reader,
            mask,
            query,
            trigger_value: AtomicBool::new(false),
            hooks: WaitsetHooks::default(),
        }
    }

    pub fn mask(&self) -> ReadMask {
        self.mask
    }

    pub fn reader(&self) -> Entity {
        self.reader
    }

    pub fn is_query(&self) -> bool {
        self.query.is_some()
    }

    pub(crate) fn excluded(&self) -> u32 {
        self.mask.excluded()
    }

    pub(crate) fn query(&self) -> Option<&QueryFilter> {
        self.query.as_ref()
    }

    /// Query bit, 0 for a plain read condition.
    pub(crate) fn query_bit(&self) -> u64 {
        self.query.as_ref().map_or(0, |q| q.bit)
    }

    /// Update the trigger; waitsets are signalled when it turns true.
    pub(crate) fn set_trigger_value(&self, value: bool) {
        let old = self.trigger_value.swap(value, Ordering::AcqRel);
        if value && !old {
            self.hooks.notify();
        }
    }
}

impl std::fmt::Debug for ReadCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCondition")
            .field("id", &self.id)
            .field("reader", &self.reader)
            .field("mask", &self.mask)
            .field("query", &self.query_bit())
            .finish()
    }
}

impl Condition for ReadCondition {
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

fn create_condition(reader: Entity, mask: ReadMask, filter: Option<SampleFilter>) -> Result<Entity> {
    let mask = mask.validate()?;
    let rd_node = entity::pin_kind(reader, EntityKind::Reader)?;
    let rd = rd_node.reader()?;
    let kind = if filter.is_some() {
        EntityKind::QueryCondition
    } else {
        EntityKind::ReadCondition
    };

    let query = match filter {
        Some(filter) => {
            let bit = rd
                .rhc
                .lock()
                .alloc_query_bit()
                .ok_or(Error::OutOfResources)?;
            Some(QueryFilter { bit, filter })
        }
        None => None,
    };
    let cond = Arc::new(ReadCondition::new(reader, mask, query));
    let created = entity::create_entity(NewEntity::child(kind, &rd_node.arc()), {
        let cond = Arc::clone(&cond);
        move |_| EntityBody::ReadCondition(cond)
    });
    let mut rhc = rd.rhc.lock();
    match created {
        Ok(handle) => {
            rhc.add_condition(Arc::clone(&cond));
            log::debug!(
                "[read_condition] {} on reader {} mask={:#x} query_bit={:#x}",
                handle,
                reader,
                mask.bits(),
                cond.query_bit()
            );
            Ok(handle)
        }
        Err(e) => {
            rhc.free_query_bit(cond.query_bit());
            Err(e)
        }
    }
}

/// Create a read condition on `reader`.
pub fn create_readcondition(reader: Entity, mask: ReadMask) -> Result<Entity> {
    create_condition(reader, mask, None)
}

/// Create a query condition on `reader`: a read condition that also requires
/// `filter` to accept the sample. `T` must be the reader's sample type.
pub fn create_querycondition<T, F>(reader: Entity, mask: ReadMask, filter: F) -> Result<Entity>
where
    T: TopicType,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    {
        let rd_node = entity::pin_kind(reader, EntityKind::Reader)?;
        if !rd_node.reader()?.sertype.alloc_sample().is::<T>() {
            return Err(Error::bad_param("filter type differs from the reader's type"));
        }
    }
    let filter: SampleFilter =
        Arc::new(move |sample: &dyn Any| sample.downcast_ref::<T>().is_some_and(&filter));
    create_condition(reader, mask, Some(filter))
}

/// Reader a read/query condition is attached to.
pub fn get_datareader(condition: Entity) -> Result<Entity> {
    let node = entity::pin(condition)?;
    match &node.body {
        EntityBody::ReadCondition(cond) => Ok(cond.reader()),
        _ => Err(Error::IllegalOperation),
    }
}

/// State mask of a read/query condition.
pub fn get_mask(condition: Entity) -> Result<ReadMask> {
    let node = entity::pin(condition)?;
    match &node.body {
        EntityBody::ReadCondition(cond) => Ok(cond.mask()),
        _ => Err(Error::IllegalOperation),
    }
}
