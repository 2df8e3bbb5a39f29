// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity tree.
//!
//! Every DDS object (participant, topic, publisher, subscriber, reader,
//! writer, conditions, waitset) is an [`EntityNode`] stored in one
//! process-wide [`HandleTable`]. Applications only ever see the [`Entity`]
//! handle; every API call pins the node for its duration, so a concurrent
//! `delete` waits for in-flight calls instead of freeing memory under them.
//!
//! ```text
//!   Entity(i32) --pin--> HandleTable --Arc--> EntityNode
//!                                              |-- parent: Arc<EntityNode>
//!                                              |-- state: children, qos, listener
//!                                              |-- status: StatusCondition
//!                                              +-- body: Reader | Writer | Topic | ...
//! ```
//!
//! Children are recorded by handle only, parents by `Arc`, so the tree has no
//! reference cycles.
//!
//! # Deletion
//!
//! 1. mark the node deleting and close its handle (no new pins)
//! 2. delete children, topics last
//! 3. wait for outstanding pins to drain (TIMEOUT leaves the entity closed;
//!    calling `delete` again resumes the wait)
//! 4. tear down kind-specific state, detach from waitsets, unlink from the
//!    parent, and delete an implicit parent left without children

use super::condition::{Condition, StatusCondition, StatusMask};
use super::domain_registry::{Domain, DomainId};
use super::listener::{find_callback, Listener, StatusCallback};
use super::qos::Qos;
use super::read_condition::ReadCondition;
use super::reader::{self, ReaderBody};
use super::topic::{self, TopicBody};
use super::waitset::{self, WaitsetBody};
use super::writer::{self, WriterBody};
use super::{Error, GuardCondition, Result};
use crate::config::RuntimeConfig;
use crate::core::handles::{Handle, HandleError, HandleKind, HandleTable, Pinned};
use crate::core::tkmap::generate_iid;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// 64-bit instance handle of an entity or a data instance.
pub type InstanceHandle = u64;

/// "No instance".
pub const HANDLE_NIL: InstanceHandle = 0;

/// Application-visible entity handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub(crate) Handle);

impl Entity {
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Entity(Handle::from_raw(raw))
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0.raw()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity kinds; the discriminant is the handle's kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    Participant = 1,
    Topic = 2,
    Publisher = 3,
    Subscriber = 4,
    Reader = 5,
    Writer = 6,
    ReadCondition = 7,
    QueryCondition = 8,
    GuardCondition = 9,
    Waitset = 10,
}

const fn kind_tag(tag: u8) -> HandleKind {
    match HandleKind::new(tag) {
        Some(kind) => kind,
        None => panic!("entity kind tag out of range"),
    }
}

const KIND_TAGS: [HandleKind; 10] = [
    kind_tag(1),
    kind_tag(2),
    kind_tag(3),
    kind_tag(4),
    kind_tag(5),
    kind_tag(6),
    kind_tag(7),
    kind_tag(8),
    kind_tag(9),
    kind_tag(10),
];

impl EntityKind {
    const ALL: [EntityKind; 10] = [
        EntityKind::Participant,
        EntityKind::Topic,
        EntityKind::Publisher,
        EntityKind::Subscriber,
        EntityKind::Reader,
        EntityKind::Writer,
        EntityKind::ReadCondition,
        EntityKind::QueryCondition,
        EntityKind::GuardCondition,
        EntityKind::Waitset,
    ];

    pub(crate) fn tag(self) -> HandleKind {
        KIND_TAGS[self as usize - 1]
    }

    /// Kind encoded in a handle value, if it is an entity kind at all.
    pub(crate) fn of_handle(handle: Handle) -> Option<EntityKind> {
        let tag = handle.kind()?.tag();
        Self::ALL.get(usize::from(tag).checked_sub(1)?).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Participant => "participant",
            EntityKind::Topic => "topic",
            EntityKind::Publisher => "publisher",
            EntityKind::Subscriber => "subscriber",
            EntityKind::Reader => "reader",
            EntityKind::Writer => "writer",
            EntityKind::ReadCondition => "readcondition",
            EntityKind::QueryCondition => "querycondition",
            EntityKind::GuardCondition => "guardcondition",
            EntityKind::Waitset => "waitset",
        }
    }

    /// Kinds with a status, a QoS and a listener.
    fn is_dcps(self) -> bool {
        matches!(
            self,
            EntityKind::Participant
                | EntityKind::Topic
                | EntityKind::Publisher
                | EntityKind::Subscriber
                | EntityKind::Reader
                | EntityKind::Writer
        )
    }

    /// Kinds whose creation honours the parent's ENTITY_FACTORY policy.
    fn honours_autoenable(self) -> bool {
        matches!(
            self,
            EntityKind::Topic
                | EntityKind::Publisher
                | EntityKind::Subscriber
                | EntityKind::Reader
                | EntityKind::Writer
        )
    }
}

/// Kind-specific part of a node.
pub(crate) enum EntityBody {
    Participant,
    Topic(TopicBody),
    Publisher,
    Subscriber,
    Reader(ReaderBody),
    Writer(WriterBody),
    ReadCondition(Arc<ReadCondition>),
    Guard(Arc<GuardCondition>),
    Waitset(WaitsetBody),
}

/// Mutable part of a node.
pub(crate) struct EntityState {
    pub(crate) children: Vec<Entity>,
    pub(crate) qos: Qos,
    pub(crate) listener: Listener,
    pub(crate) enabled: bool,
    /// Created on the application's behalf; deleted with its last child.
    pub(crate) implicit: bool,
    pub(crate) deleting: bool,
    /// Waitsets this entity is attached to.
    pub(crate) waitsets: Vec<Entity>,
}

pub(crate) struct EntityNode {
    pub(crate) kind: EntityKind,
    pub(crate) handle: Entity,
    pub(crate) iid: InstanceHandle,
    pub(crate) parent: Option<Arc<EntityNode>>,
    pub(crate) domain: Arc<Domain>,
    pub(crate) state: Mutex<EntityState>,
    pub(crate) status: Arc<StatusCondition>,
    pub(crate) body: EntityBody,
}

impl EntityNode {
    pub(crate) fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub(crate) fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(Error::NotEnabled)
        }
    }

    pub(crate) fn qos(&self) -> Qos {
        self.state.lock().qos.clone()
    }

    pub(crate) fn participant(&self) -> &EntityNode {
        let mut node = self;
        while let Some(parent) = node.parent.as_deref() {
            node = parent;
        }
        node
    }

    /// Listeners from this entity up to its participant.
    pub(crate) fn listener_chain(&self) -> Vec<Listener> {
        let mut chain = vec![self.state.lock().listener.clone()];
        let mut node = self.parent.as_deref();
        while let Some(n) = node {
            chain.push(n.state.lock().listener.clone());
            node = n.parent.as_deref();
        }
        chain
    }

    pub(crate) fn reader(&self) -> Result<&ReaderBody> {
        match &self.body {
            EntityBody::Reader(body) => Ok(body),
            _ => Err(Error::IllegalOperation),
        }
    }

    pub(crate) fn writer(&self) -> Result<&WriterBody> {
        match &self.body {
            EntityBody::Writer(body) => Ok(body),
            _ => Err(Error::IllegalOperation),
        }
    }

    pub(crate) fn topic(&self) -> Result<&TopicBody> {
        match &self.body {
            EntityBody::Topic(body) => Ok(body),
            _ => Err(Error::IllegalOperation),
        }
    }

    pub(crate) fn waitset(&self) -> Result<&WaitsetBody> {
        match &self.body {
            EntityBody::Waitset(body) => Ok(body),
            _ => Err(Error::IllegalOperation),
        }
    }

    /// Condition a waitset observes when this entity is attached.
    pub(crate) fn condition(&self) -> Arc<dyn Condition> {
        match &self.body {
            EntityBody::ReadCondition(cond) => Arc::clone(cond) as Arc<dyn Condition>,
            EntityBody::Guard(guard) => Arc::clone(guard) as Arc<dyn Condition>,
            EntityBody::Waitset(ws) => ws.trigger() as Arc<dyn Condition>,
            _ => Arc::clone(&self.status) as Arc<dyn Condition>,
        }
    }
}

impl fmt::Debug for EntityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityNode")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("iid", &format_args!("{:#x}", self.iid))
            .finish()
    }
}

// ============================================================================
// Handle table
// ============================================================================

fn table() -> &'static HandleTable<EntityNode> {
    static TABLE: OnceLock<HandleTable<EntityNode>> = OnceLock::new();
    TABLE.get_or_init(|| HandleTable::new(RuntimeConfig::global().core().max_handles))
}

/// Entities whose delete timed out, kept until a retried delete completes.
fn pending_deletes() -> &'static DashMap<Entity, Arc<EntityNode>> {
    static PENDING: OnceLock<DashMap<Entity, Arc<EntityNode>>> = OnceLock::new();
    PENDING.get_or_init(DashMap::new)
}

/// Pin any entity for the duration of a call.
pub(crate) fn pin(entity: Entity) -> Result<Pinned<'static, EntityNode>> {
    if EntityKind::of_handle(entity.0).is_none() {
        return Err(Error::bad_param(format!("{} is not an entity handle", entity)));
    }
    Ok(table().pin(entity.0, None)?)
}

/// Pin an entity that must be of `kind`.
pub(crate) fn pin_kind(entity: Entity, kind: EntityKind) -> Result<Pinned<'static, EntityNode>> {
    if EntityKind::of_handle(entity.0).is_none() {
        return Err(Error::bad_param(format!("{} is not an entity handle", entity)));
    }
    Ok(table().pin(entity.0, Some(kind.tag()))?)
}

/// Live handles of `kind`.
pub(crate) fn handles_of(kind: EntityKind) -> Vec<Entity> {
    table()
        .handles(Some(kind.tag()))
        .into_iter()
        .map(Entity)
        .collect()
}

// ============================================================================
// Creation
// ============================================================================

/// Parameters of an entity about to be created.
pub(crate) struct NewEntity {
    kind: EntityKind,
    parent: Option<Arc<EntityNode>>,
    domain: Arc<Domain>,
    qos: Qos,
    listener: Listener,
    enabled: bool,
    implicit: bool,
}

impl NewEntity {
    pub(crate) fn participant(domain: Arc<Domain>) -> Self {
        Self {
            kind: EntityKind::Participant,
            parent: None,
            domain,
            qos: Qos::default(),
            listener: Listener::default(),
            enabled: true,
            implicit: false,
        }
    }

    pub(crate) fn child(kind: EntityKind, parent: &Arc<EntityNode>) -> Self {
        let enabled = if kind.honours_autoenable() {
            let st = parent.state.lock();
            st.enabled && st.qos.is_autoenable()
        } else {
            true
        };
        Self {
            kind,
            parent: Some(Arc::clone(parent)),
            domain: Arc::clone(&parent.domain),
            qos: Qos::default(),
            listener: Listener::default(),
            enabled,
            implicit: false,
        }
    }

    pub(crate) fn qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub(crate) fn listener(mut self, listener: Option<Listener>) -> Self {
        self.listener = listener.unwrap_or_default();
        self
    }

    pub(crate) fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }
}

/// Create a node, link it under its parent and enable it if it is born enabled.
///
/// `body` runs with the handle table locked and must not call into it.
pub(crate) fn create_entity(
    new: NewEntity,
    body: impl FnOnce(Entity) -> EntityBody,
) -> Result<Entity> {
    let NewEntity {
        kind,
        parent,
        domain,
        qos,
        listener,
        enabled,
        implicit,
    } = new;
    let iid = generate_iid();
    let status = Arc::new(StatusCondition::new(StatusMask::valid_for(kind)));

    let handle = table().create_with(kind.tag(), |h| {
        let handle = Entity(h);
        EntityNode {
            kind,
            handle,
            iid,
            parent: parent.clone(),
            domain,
            state: Mutex::new(EntityState {
                children: Vec::new(),
                qos,
                listener,
                enabled,
                implicit,
                deleting: false,
                waitsets: Vec::new(),
            }),
            status,
            body: body(handle),
        }
    })?;
    let entity = Entity(handle);

    if let Some(parent) = &parent {
        let mut st = parent.state.lock();
        if st.deleting {
            drop(st);
            let _ = table().delete(handle, Duration::ZERO);
            return Err(Error::AlreadyDeleted);
        }
        st.children.push(entity);
    }

    log::debug!(
        "[entity] created {} {} iid={:#x} enabled={}",
        kind.name(),
        entity,
        iid,
        enabled
    );
    if enabled {
        let node = pin(entity)?;
        on_enable(&node.arc());
    }
    Ok(entity)
}

fn on_enable(node: &Arc<EntityNode>) {
    match &node.body {
        EntityBody::Reader(_) => reader::on_enable(node),
        EntityBody::Writer(_) => writer::on_enable(node),
        _ => {}
    }
}

// ============================================================================
// Deletion
// ============================================================================

/// Delete an entity and everything below it.
pub fn delete(entity: Entity) -> Result<()> {
    delete_with_timeout(entity, RuntimeConfig::global().core().delete_timeout)
}

pub(crate) fn delete_with_timeout(entity: Entity, timeout: Duration) -> Result<()> {
    let node = match pin(entity) {
        Ok(pinned) => {
            let node = pinned.arc();
            drop(pinned);
            begin_delete(&node)?;
            node
        }
        Err(Error::AlreadyDeleted) => pending_deletes()
            .remove(&entity)
            .map(|(_, node)| node)
            .ok_or(Error::AlreadyDeleted)?,
        Err(e) => return Err(e),
    };

    let drained = delete_children(&node, timeout)
        .and_then(|()| table().delete(entity.0, timeout).map_err(Error::from));
    if let Err(e) = drained {
        log::warn!(
            "[entity] delete of {} {} incomplete: {}",
            node.kind.name(),
            entity,
            e
        );
        pending_deletes().insert(entity, Arc::clone(&node));
        return Err(e);
    }

    finish_delete(&node);
    Ok(())
}

fn begin_delete(node: &Arc<EntityNode>) -> Result<()> {
    if let EntityBody::Topic(topic) = &node.body {
        if topic.users() > 0 {
            return Err(Error::precondition(format!(
                "topic {} still has {} reader(s)/writer(s)",
                topic.name,
                topic.users()
            )));
        }
    }
    {
        let mut st = node.state.lock();
        if st.deleting {
            return Err(Error::AlreadyDeleted);
        }
        st.deleting = true;
    }
    match table().close(node.handle.0) {
        Ok(()) | Err(HandleError::Closed) => {}
        Err(e) => return Err(e.into()),
    }
    if let EntityBody::Waitset(ws) = &node.body {
        ws.close();
    }
    Ok(())
}

fn delete_children(node: &EntityNode, timeout: Duration) -> Result<()> {
    let children = node.state.lock().children.clone();
    let (topics, others): (Vec<Entity>, Vec<Entity>) = children
        .into_iter()
        .partition(|c| EntityKind::of_handle(c.0) == Some(EntityKind::Topic));
    for child in others.into_iter().chain(topics) {
        match delete_with_timeout(child, timeout) {
            Ok(()) | Err(Error::AlreadyDeleted) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn finish_delete(node: &Arc<EntityNode>) {
    match &node.body {
        EntityBody::Reader(_) => reader::teardown(node),
        EntityBody::Writer(_) => writer::teardown(node),
        EntityBody::Topic(_) => topic::teardown(node),
        EntityBody::ReadCondition(cond) => {
            if let Some(Ok(rd)) = node.parent.as_deref().map(EntityNode::reader) {
                rd.rhc.lock().remove_condition(cond);
            }
        }
        EntityBody::Waitset(ws) => ws.detach_all(node.handle),
        _ => {}
    }

    let waitsets = std::mem::take(&mut node.state.lock().waitsets);
    for ws in waitsets {
        waitset::forget_entity(ws, node.handle);
    }

    if let Some(parent) = &node.parent {
        let orphaned = {
            let mut st = parent.state.lock();
            st.children.retain(|c| *c != node.handle);
            st.implicit && st.children.is_empty() && !st.deleting
        };
        if orphaned {
            match delete(parent.handle) {
                Ok(()) | Err(Error::AlreadyDeleted) => {}
                Err(e) => log::warn!(
                    "[entity] implicit {} {} not deleted: {}",
                    parent.kind.name(),
                    parent.handle,
                    e
                ),
            }
        }
    }
    log::debug!("[entity] deleted {} {}", node.kind.name(), node.handle);
}

// ============================================================================
// Listener dispatch
// ============================================================================

/// Hand a status to the nearest listener with a callback for it, or raise it
/// on the entity when nobody listens.
///
/// `snapshot` runs only when a callback is found; it returns the status value
/// passed to the callback and resets its change counters.
pub(crate) fn notify_status<S>(
    node: &EntityNode,
    bit: StatusMask,
    pick: impl Fn(&Listener) -> &Option<StatusCallback<S>>,
    snapshot: impl FnOnce() -> S,
) {
    match find_callback(&node.listener_chain(), pick) {
        Some(callback) => {
            node.status.reset(bit);
            callback(node.handle, snapshot());
        }
        None => node.status.set(bit),
    }
}

/// New data in `reader`: DATA_ON_READERS on the subscriber side wins over
/// DATA_AVAILABLE on the reader side.
pub(crate) fn notify_data_available(reader: &EntityNode) {
    let Some(subscriber) = reader.parent.as_deref() else {
        return;
    };
    if let Some(callback) = find_callback(&subscriber.listener_chain(), |l| &l.data_on_readers) {
        subscriber.status.reset(StatusMask::DATA_ON_READERS);
        callback(subscriber.handle);
    } else if let Some(callback) = find_callback(&reader.listener_chain(), |l| &l.data_available)
    {
        reader.status.reset(StatusMask::DATA_AVAILABLE);
        callback(reader.handle);
    } else {
        reader.status.set(StatusMask::DATA_AVAILABLE);
        subscriber.status.set(StatusMask::DATA_ON_READERS);
    }
}

// ============================================================================
// Public entity API
// ============================================================================

/// Enable an entity created under a parent with `autoenable_created_entities = false`.
pub fn enable(entity: Entity) -> Result<()> {
    let pinned = pin(entity)?;
    let node = pinned.arc();
    if let Some(parent) = &node.parent {
        if !parent.is_enabled() {
            return Err(Error::precondition("parent is not enabled"));
        }
    }
    let newly_enabled = {
        let mut st = node.state.lock();
        !std::mem::replace(&mut st.enabled, true)
    };
    if newly_enabled {
        log::debug!("[entity] enabled {} {}", node.kind.name(), entity);
        on_enable(&node);
    }
    Ok(())
}

pub fn get_kind(entity: Entity) -> Result<EntityKind> {
    Ok(pin(entity)?.kind)
}

/// Parent of `entity`; `None` for a participant.
pub fn get_parent(entity: Entity) -> Result<Option<Entity>> {
    Ok(pin(entity)?.parent.as_ref().map(|p| p.handle))
}

pub fn get_participant(entity: Entity) -> Result<Entity> {
    Ok(pin(entity)?.participant().handle)
}

/// Live children of `entity`.
pub fn get_children(entity: Entity) -> Result<Vec<Entity>> {
    let children = pin(entity)?.state.lock().children.clone();
    Ok(children
        .into_iter()
        .filter(|c| table().status(c.0, None).is_ok())
        .collect())
}

pub fn get_domain_id(entity: Entity) -> Result<DomainId> {
    Ok(pin(entity)?.domain.domain_id())
}

pub fn get_instance_handle(entity: Entity) -> Result<InstanceHandle> {
    Ok(pin(entity)?.iid)
}

fn pin_dcps(entity: Entity) -> Result<Pinned<'static, EntityNode>> {
    let node = pin(entity)?;
    if node.kind.is_dcps() {
        Ok(node)
    } else {
        Err(Error::IllegalOperation)
    }
}

pub fn get_qos(entity: Entity) -> Result<Qos> {
    Ok(pin_dcps(entity)?.qos())
}

/// Merge `qos` into the entity's QoS.
///
/// Once enabled, policies that are fixed at creation (reliability,
/// durability, history, resource limits) cannot change.
pub fn set_qos(entity: Entity, qos: &Qos) -> Result<()> {
    let node = pin_dcps(entity)?;
    let mut st = node.state.lock();
    let mut merged = qos.clone();
    merged.merge_missing(&st.qos);
    merged.validate()?;
    if st.enabled {
        st.qos.check_mutable(qos)?;
    }
    st.qos = merged;
    log::debug!("[entity] qos of {} {} updated", node.kind.name(), entity);
    Ok(())
}

pub fn get_listener(entity: Entity) -> Result<Listener> {
    Ok(pin_dcps(entity)?.state.lock().listener.clone())
}

/// Replace the entity's listener; `None` removes all callbacks.
pub fn set_listener(entity: Entity, listener: Option<Listener>) -> Result<()> {
    pin_dcps(entity)?.state.lock().listener = listener.unwrap_or_default();
    Ok(())
}

fn check_status_bits(kind: EntityKind, mask: StatusMask) -> Result<()> {
    let invalid = mask & !StatusMask::valid_for(kind);
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(Error::bad_param(format!(
            "status bits {:#x} are not valid for a {}",
            invalid.bits(),
            kind.name()
        )))
    }
}

/// Status bits currently set.
pub fn get_status_changes(entity: Entity) -> Result<StatusMask> {
    Ok(pin_dcps(entity)?.status.get_active_statuses())
}

/// Status bits that trigger the entity's status condition.
pub fn get_status_mask(entity: Entity) -> Result<StatusMask> {
    Ok(pin_dcps(entity)?.status.get_enabled_statuses())
}

pub fn set_status_mask(entity: Entity, mask: StatusMask) -> Result<()> {
    let node = pin_dcps(entity)?;
    check_status_bits(node.kind, mask)?;
    if node.state.lock().deleting {
        return Err(Error::precondition("entity is being deleted"));
    }
    node.status.reset(!mask);
    node.status.set_enabled_statuses(mask);
    Ok(())
}

/// Status bits of `mask` that are set, leaving them set.
pub fn read_status(entity: Entity, mask: StatusMask) -> Result<StatusMask> {
    let node = pin_dcps(entity)?;
    check_status_bits(node.kind, mask)?;
    Ok(node.status.get_active_statuses() & mask)
}

/// Status bits of `mask` that are set, clearing them.
pub fn take_status(entity: Entity, mask: StatusMask) -> Result<StatusMask> {
    let node = pin_dcps(entity)?;
    check_status_bits(node.kind, mask)?;
    Ok(node.status.take(mask))
}
