// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Publisher entity - groups DataWriters
//!
//! A publisher carries the group-level QoS (GROUP_DATA, ENTITY_FACTORY) its
//! writers inherit. Writers created directly on a participant get an
//! implicit publisher of their own, deleted together with the writer.

use super::entity::{self, EntityBody, EntityKind, EntityNode, NewEntity};
use super::listener::Listener;
use super::qos::Qos;
use super::{Entity, Result};
use std::sync::Arc;

/// Create a publisher under `participant`.
pub fn create_publisher(
    participant: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let pp = entity::pin_kind(participant, EntityKind::Participant)?;
    let qos = qos.cloned().unwrap_or_default();
    qos.validate()?;
    entity::create_entity(
        NewEntity::child(EntityKind::Publisher, &pp.arc())
            .qos(qos)
            .listener(listener),
        |_| EntityBody::Publisher,
    )
}

/// Publisher created on the application's behalf for a writer of `participant`.
pub(crate) fn create_implicit(participant: &Arc<EntityNode>) -> Result<Entity> {
    entity::create_entity(
        NewEntity::child(EntityKind::Publisher, participant).implicit(),
        |_| EntityBody::Publisher,
    )
}
