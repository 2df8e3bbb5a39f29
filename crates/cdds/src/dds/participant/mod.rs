// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS Participant
//!
//! A participant joins one domain and is the root of an entity tree: every
//! topic, publisher, subscriber, reader, writer, condition and waitset is
//! created under one and deleted with it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdds::dds::{self, Qos};
//!
//! let participant = dds::create_participant(0, None, None)?;
//! let publisher = dds::create_publisher(participant, None, None)?;
//! assert_eq!(dds::get_parent(publisher)?, Some(participant));
//! assert_eq!(dds::lookup_participants(0), vec![participant]);
//!
//! dds::delete(participant)?;
//! assert!(dds::get_parent(publisher).is_err());
//! # Ok::<(), cdds::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                    Participant                      |
//! |  +-------------+  +-------------+  +-------------+  |
//! |  |  Publisher  |  | Subscriber  |  |   Topic     |  |
//! |  |  +-------+  |  |  +-------+  |  |             |  |
//! |  |  |Writer |  |  |  |Reader |  |  |             |  |
//! |  |  +-------+  |  |  +-------+  |  |             |  |
//! |  +-------------+  +-------------+  +-------------+  |
//! +-----------------------------------------------------+
//! |   Domain: instance map | topic types | endpoints    |
//! +-----------------------------------------------------+
//! ```

use super::domain_registry::{DomainId, DomainRegistry};
use super::entity::{self, EntityBody, EntityKind, NewEntity};
use super::listener::Listener;
use super::qos::Qos;
use super::{Entity, Error, Result};
use crate::config::MAX_DOMAIN_ID;

/// Create a participant in `domain_id`.
pub fn create_participant(
    domain_id: DomainId,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    if domain_id > MAX_DOMAIN_ID {
        return Err(Error::bad_param(format!(
            "domain id {} exceeds {}",
            domain_id, MAX_DOMAIN_ID
        )));
    }
    let qos = qos.cloned().unwrap_or_default();
    qos.validate()?;
    let domain = DomainRegistry::global().get_or_create(domain_id);
    let participant = entity::create_entity(
        NewEntity::participant(domain).qos(qos).listener(listener),
        |_| EntityBody::Participant,
    )?;
    log::info!("[participant] {} joined domain {}", participant, domain_id);
    Ok(participant)
}

/// Live participants of `domain_id`.
pub fn lookup_participants(domain_id: DomainId) -> Vec<Entity> {
    entity::handles_of(EntityKind::Participant)
        .into_iter()
        .filter(|pp| entity::get_domain_id(*pp).is_ok_and(|id| id == domain_id))
        .collect()
}
