// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS Topic
//!
//! A topic binds a name to a sertype within a participant. All participants
//! of a domain share one sertype per topic name; creating the same name with
//! a different type anywhere in the domain fails with PRECONDITION_NOT_MET.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdds::dds;
//! # use cdds::core::ser::{Cursor, CdrWriter, SerResult};
//! # #[derive(Default, Clone)] struct Command { action: u32 }
//! # impl cdds::core::serdata::TopicType for Command {
//! #     fn type_name() -> &'static str { "Command" }
//! #     fn encode(&self, w: &mut CdrWriter) -> SerResult<()> { w.write_u32(self.action) }
//! #     fn decode(r: &mut Cursor<'_>) -> SerResult<Self> { Ok(Self { action: r.read_u32()? }) }
//! # }
//!
//! let participant = dds::create_participant(0, None, None)?;
//! let topic = dds::create_topic::<Command>(participant, "robot/commands", None, None)?;
//! assert_eq!(dds::get_name(topic)?, "robot/commands");
//! assert_eq!(dds::find_topic(participant, "robot/commands")?, Some(topic));
//! # Ok::<(), cdds::Error>(())
//! ```

use super::entity::{self, EntityBody, EntityKind, EntityNode, NewEntity};
use super::listener::{InconsistentTopicStatus, Listener};
use super::qos::Qos;
use super::{Entity, Error, Result, StatusMask};
use crate::core::serdata::{DefaultSertype, SertypeRef, TopicType};
use crate::logging::LogCategory;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Topic-specific part of a topic entity.
pub(crate) struct TopicBody {
    pub(crate) name: String,
    pub(crate) sertype: SertypeRef,
    /// Readers and writers created on this topic and not yet deleted.
    users: AtomicU32,
    inconsistent: Mutex<InconsistentTopicStatus>,
}

impl TopicBody {
    pub(crate) fn users(&self) -> u32 {
        self.users.load(Ordering::Acquire)
    }

    pub(crate) fn add_user(&self) {
        self.users.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn remove_user(&self) {
        self.users.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Topic names: letters, digits, `_` and `/`, not starting with a digit.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if !first.is_ascii_digit() => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
}

/// Topic of `participant` named `name`, if any.
fn lookup_local(participant: &EntityNode, name: &str) -> Option<Entity> {
    let children = participant.state.lock().children.clone();
    children.into_iter().find(|child| {
        entity::pin_kind(*child, EntityKind::Topic)
            .ok()
            .is_some_and(|node| node.topic().is_ok_and(|t| t.name == name))
    })
}

fn record_inconsistent(topic: Entity) {
    let Ok(node) = entity::pin_kind(topic, EntityKind::Topic) else {
        return;
    };
    let Ok(body) = node.topic() else {
        return;
    };
    body.inconsistent.lock().record();
    entity::notify_status(
        &node,
        StatusMask::INCONSISTENT_TOPIC,
        |l| &l.inconsistent_topic,
        || {
            let mut st = body.inconsistent.lock();
            let snapshot = *st;
            st.reset_changes();
            snapshot
        },
    );
}

/// Create a topic for Rust type `T`.
pub fn create_topic<T: TopicType>(
    participant: Entity,
    name: &str,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    create_topic_sertype(participant, name, DefaultSertype::<T>::new_ref(), qos, listener)
}

/// Create a topic for an application-provided sertype.
///
/// Creating a topic that already exists in `participant` with an equal type
/// and QoS returns the existing handle.
pub fn create_topic_sertype(
    participant: Entity,
    name: &str,
    sertype: SertypeRef,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    if !is_valid_name(name) {
        return Err(Error::bad_param(format!("invalid topic name '{}'", name)));
    }
    let qos = qos.cloned().unwrap_or_default();
    qos.validate()?;
    let pp = entity::pin_kind(participant, EntityKind::Participant)?;

    if let Some(existing) = lookup_local(&pp, name) {
        let (same_type, same_qos, type_name) = {
            let node = entity::pin_kind(existing, EntityKind::Topic)?;
            let body = node.topic()?;
            (
                body.sertype.equal(sertype.as_ref()),
                node.qos() == qos,
                body.sertype.type_name().to_string(),
            )
        };
        if !same_type {
            record_inconsistent(existing);
            return Err(Error::precondition(format!(
                "topic '{}' exists with type '{}'",
                name, type_name
            )));
        }
        if !same_qos {
            return Err(Error::InconsistentPolicy(format!(
                "topic '{}' exists with a different qos",
                name
            )));
        }
        return Ok(existing);
    }

    let sertype = pp.domain.acquire_topic(name, &sertype)?;
    let created = entity::create_entity(
        NewEntity::child(EntityKind::Topic, &pp.arc())
            .qos(qos)
            .listener(listener),
        {
            let sertype = Arc::clone(&sertype);
            let name = name.to_string();
            move |_| {
                EntityBody::Topic(TopicBody {
                    name,
                    sertype,
                    users: AtomicU32::new(0),
                    inconsistent: Mutex::new(InconsistentTopicStatus::default()),
                })
            }
        },
    );
    if created.is_err() {
        pp.domain.release_topic(name);
    }
    let topic = created?;
    crate::dds_log!(
        LogCategory::TOPIC,
        "[topic] '{}' type '{}' -> {}",
        name,
        sertype.type_name(),
        topic
    );
    Ok(topic)
}

/// Topic `name` as seen by `participant`.
///
/// Returns the participant's own topic if it has one, otherwise creates a
/// topic from the type another participant of the domain registered under
/// that name. `None` when the domain does not know the name.
pub fn find_topic(participant: Entity, name: &str) -> Result<Option<Entity>> {
    if !is_valid_name(name) {
        return Err(Error::bad_param(format!("invalid topic name '{}'", name)));
    }
    let pp = entity::pin_kind(participant, EntityKind::Participant)?;
    if let Some(existing) = lookup_local(&pp, name) {
        return Ok(Some(existing));
    }
    let Some(sertype) = pp.domain.topic_sertype(name) else {
        return Ok(None);
    };
    drop(pp);
    create_topic_sertype(participant, name, sertype, None, None).map(Some)
}

pub fn get_name(topic: Entity) -> Result<String> {
    let node = entity::pin_kind(topic, EntityKind::Topic)?;
    Ok(node.topic()?.name.clone())
}

pub fn get_type_name(topic: Entity) -> Result<String> {
    let node = entity::pin_kind(topic, EntityKind::Topic)?;
    Ok(node.topic()?.sertype.type_name().to_string())
}

/// Topic a reader, writer or read condition operates on; a topic maps to itself.
pub fn get_topic(entity: Entity) -> Result<Entity> {
    let node = entity::pin(entity)?;
    match &node.body {
        EntityBody::Topic(_) => Ok(entity),
        EntityBody::Reader(rd) => Ok(rd.topic),
        EntityBody::Writer(wr) => Ok(wr.topic),
        EntityBody::ReadCondition(_) => node
            .parent
            .as_deref()
            .ok_or(Error::IllegalOperation)?
            .reader()
            .map(|rd| rd.topic),
        _ => Err(Error::IllegalOperation),
    }
}

pub(crate) fn teardown(node: &Arc<EntityNode>) {
    if let Ok(body) = node.topic() {
        node.domain.release_topic(&body.name);
    }
}
