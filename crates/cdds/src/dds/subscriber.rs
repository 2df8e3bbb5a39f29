// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Subscriber entity - groups DataReaders
//!
//! Besides carrying group-level QoS, the subscriber owns the DATA_ON_READERS
//! status: new data in any of its readers raises it (or invokes its
//! listener) before the reader's own DATA_AVAILABLE is considered.

use super::entity::{self, EntityBody, EntityKind, EntityNode, NewEntity};
use super::listener::Listener;
use super::qos::Qos;
use super::{Entity, Result};
use std::sync::Arc;

/// Create a subscriber under `participant`.
pub fn create_subscriber(
    participant: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let pp = entity::pin_kind(participant, EntityKind::Participant)?;
    let qos = qos.cloned().unwrap_or_default();
    qos.validate()?;
    entity::create_entity(
        NewEntity::child(EntityKind::Subscriber, &pp.arc())
            .qos(qos)
            .listener(listener),
        |_| EntityBody::Subscriber,
    )
}

/// Subscriber created on the application's behalf for a reader of `participant`.
pub(crate) fn create_implicit(participant: &Arc<EntityNode>) -> Result<Entity> {
    entity::create_entity(
        NewEntity::child(EntityKind::Subscriber, participant).implicit(),
        |_| EntityBody::Subscriber,
    )
}
