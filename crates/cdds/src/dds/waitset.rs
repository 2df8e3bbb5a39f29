// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waitsets: block until attached entities trigger.
//!
//! Backed by the runtime waitset driver (`core::rt::waitset`). Attaching an
//! entity registers a driver slot with the entity's condition (its status
//! condition, or the read/guard condition itself), which signals the slot
//! whenever its trigger value may have become true. `wait` re-evaluates the
//! trigger values, so spurious wake-ups are harmless.
//!
//! A waitset can be attached to itself; it then triggers through its own
//! trigger flag ([`waitset_set_trigger`]).
//!
//! Deleting a waitset closes its driver: a thread blocked in `wait` returns
//! ALREADY_DELETED instead of waiting for the delete to time out.

use super::condition::{Condition, GuardCondition};
use super::entity::{self, EntityBody, EntityKind, EntityNode, NewEntity};
use super::time::{self, Time};
use super::{Entity, Error, Result};
use crate::core::rt::{WaitsetDriver, WaitsetError, WaitsetSignal, WAITSET_DEFAULT_MAX_SLOTS};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Value returned by `wait` for a triggered attachment.
pub type AttachArg = i64;

struct Attachment {
    entity: Entity,
    node: Weak<EntityNode>,
    arg: AttachArg,
    cond: Arc<dyn Condition>,
    slot_index: usize,
    slot_id: u64,
    signal: Arc<dyn WaitsetSignal>,
}

/// Waitset-specific part of a waitset entity.
pub(crate) struct WaitsetBody {
    driver: WaitsetDriver,
    attached: Mutex<Vec<Attachment>>,
    trigger: Arc<GuardCondition>,
}

impl WaitsetBody {
    fn new() -> Self {
        Self {
            driver: WaitsetDriver::new(WAITSET_DEFAULT_MAX_SLOTS),
            attached: Mutex::new(Vec::new()),
            trigger: Arc::new(GuardCondition::new()),
        }
    }

    pub(crate) fn trigger(&self) -> Arc<GuardCondition> {
        Arc::clone(&self.trigger)
    }

    pub(crate) fn close(&self) {
        self.driver.close();
    }

    fn release(&self, att: &Attachment, own: Entity) {
        att.cond.remove_waitset_signal(att.signal.id());
        self.driver.unregister_slot(att.slot_index, att.slot_id);
        if let Some(node) = att.node.upgrade() {
            node.state.lock().waitsets.retain(|ws| *ws != own);
        }
    }

    /// Drop every attachment; called when the waitset is deleted.
    pub(crate) fn detach_all(&self, own: Entity) {
        let attached = std::mem::take(&mut *self.attached.lock());
        for att in &attached {
            self.release(att, own);
        }
    }

    fn triggered(&self) -> Vec<AttachArg> {
        self.attached
            .lock()
            .iter()
            .filter(|att| att.cond.get_trigger_value())
            .map(|att| att.arg)
            .collect()
    }
}

fn pin_waitset(ws: Entity) -> Result<Arc<EntityNode>> {
    Ok(entity::pin_kind(ws, EntityKind::Waitset)?.arc())
}

/// Create a waitset owned by `participant`.
pub fn create_waitset(participant: Entity) -> Result<Entity> {
    let pp = entity::pin(participant)?;
    if pp.kind != EntityKind::Participant {
        return Err(Error::IllegalOperation);
    }
    entity::create_entity(
        NewEntity::child(EntityKind::Waitset, &pp.arc()),
        |_| EntityBody::Waitset(WaitsetBody::new()),
    )
}

/// Attach `entity` with `arg`, the value `wait` reports when it triggers.
///
/// The entity must belong to the waitset's participant; attaching the same
/// entity twice fails with PRECONDITION_NOT_MET.
pub fn waitset_attach(waitset: Entity, entity: Entity, arg: AttachArg) -> Result<()> {
    let ws_node = pin_waitset(waitset)?;
    let body = ws_node.waitset()?;
    let target = entity::pin(entity)?.arc();
    if target.participant().handle != ws_node.participant().handle {
        return Err(Error::bad_param(format!(
            "{} is outside the participant of waitset {}",
            entity, waitset
        )));
    }

    let mut attached = body.attached.lock();
    if attached.iter().any(|att| att.entity == entity) {
        return Err(Error::precondition(format!(
            "{} already attached to {}",
            entity, waitset
        )));
    }
    let (slot_index, slot_id, signal) = body
        .driver
        .register_slot()
        .map_err(|e| {
            log::debug!("[waitset] {} attach failed: {}", waitset, e);
            Error::OutOfResources
        })?
        .into_trait();
    let cond = target.condition();
    cond.add_waitset_signal(Arc::clone(&signal));
    let att = Attachment {
        entity,
        node: Arc::downgrade(&target),
        arg,
        cond,
        slot_index,
        slot_id,
        signal,
    };

    if entity != waitset {
        let mut st = target.state.lock();
        if st.deleting {
            drop(st);
            body.release(&att, waitset);
            return Err(Error::AlreadyDeleted);
        }
        st.waitsets.push(waitset);
    }
    attached.push(att);
    log::debug!("[waitset] {} attached {} arg={}", waitset, entity, arg);
    Ok(())
}

/// Detach `entity`; PRECONDITION_NOT_MET if it is not attached.
pub fn waitset_detach(waitset: Entity, entity: Entity) -> Result<()> {
    let ws_node = pin_waitset(waitset)?;
    let body = ws_node.waitset()?;
    let att = {
        let mut attached = body.attached.lock();
        let pos = attached
            .iter()
            .position(|att| att.entity == entity)
            .ok_or_else(|| Error::precondition(format!("{} not attached to {}", entity, waitset)))?;
        attached.remove(pos)
    };
    body.release(&att, waitset);
    Ok(())
}

/// Forget an entity that is being deleted.
pub(crate) fn forget_entity(waitset: Entity, entity: Entity) {
    let Ok(ws_node) = pin_waitset(waitset) else {
        return;
    };
    let Ok(body) = ws_node.waitset() else {
        return;
    };
    let removed = {
        let mut attached = body.attached.lock();
        attached
            .iter()
            .position(|att| att.entity == entity)
            .map(|pos| attached.remove(pos))
    };
    if let Some(att) = removed {
        att.cond.remove_waitset_signal(att.signal.id());
        body.driver.unregister_slot(att.slot_index, att.slot_id);
        // wake waiters so they re-evaluate without the deleted entity
        body.driver.manual_notify();
    }
}

/// Set the waitset's own trigger flag.
pub fn waitset_set_trigger(waitset: Entity, trigger: bool) -> Result<()> {
    let ws_node = pin_waitset(waitset)?;
    ws_node.waitset()?.trigger.set_trigger_value(trigger);
    Ok(())
}

/// Entities currently attached.
pub fn waitset_get_entities(waitset: Entity) -> Result<Vec<Entity>> {
    let ws_node = pin_waitset(waitset)?;
    let entities = ws_node
        .waitset()?
        .attached
        .lock()
        .iter()
        .map(|att| att.entity)
        .collect();
    Ok(entities)
}

fn wait_impl(waitset: Entity, xs: &mut [AttachArg], deadline: Option<Instant>) -> Result<usize> {
    // Hold the node, not a pin: a pin would make deleting the waitset wait
    // for this call instead of waking it.
    let node = pin_waitset(waitset)?;
    let body = node.waitset()?;
    loop {
        if body.driver.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        let triggered = body.triggered();
        if !triggered.is_empty() {
            for (slot, arg) in xs.iter_mut().zip(&triggered) {
                *slot = *arg;
            }
            return Ok(triggered.len());
        }
        match body.driver.wait(deadline) {
            Ok(_) => {}
            Err(WaitsetError::Timeout) => return Ok(0),
            Err(WaitsetError::Closed) => return Err(Error::AlreadyDeleted),
            Err(WaitsetError::CapacityExceeded(_)) => return Err(Error::OutOfResources),
        }
    }
}

/// Wait up to `timeout` for attached entities to trigger.
///
/// Returns the number of triggered entities (which may exceed `xs.len()`;
/// `xs` receives the first ones' attach args), or 0 on timeout.
pub fn waitset_wait(waitset: Entity, xs: &mut [AttachArg], timeout: Duration) -> Result<usize> {
    wait_impl(waitset, xs, time::deadline_after(timeout))
}

/// [`waitset_wait`] with an absolute deadline.
pub fn waitset_wait_until(waitset: Entity, xs: &mut [AttachArg], abstime: Time) -> Result<usize> {
    wait_impl(waitset, xs, time::deadline_at(abstime))
}
