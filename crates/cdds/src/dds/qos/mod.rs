// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Quality of Service policies.
//!
//! A [`Qos`] is a sparse policy set: every policy is optional and unset
//! policies fall back to the topic's QoS, then to the entity-kind default.
//! This matches how QoS objects are passed to `create_*` and `set_qos`.
//!
//! | Policy | Reader default | Writer default |
//! |--------|----------------|----------------|
//! | reliability | BEST_EFFORT | RELIABLE, 100 ms blocking |
//! | durability | VOLATILE | VOLATILE |
//! | history | KEEP_LAST(1) | KEEP_LAST(1) |
//! | resource_limits | unlimited | unlimited |
//! | writer_data_lifecycle | - | autodispose |

mod builders;
#[cfg(feature = "config-loaders")]
pub mod yaml;

use crate::dds::{Error, Result};
use std::time::Duration;

/// Unlimited resource limit.
pub const LENGTH_UNLIMITED: i32 = -1;

/// Default `max_blocking_time` for reliable writers.
pub const DEFAULT_MAX_BLOCKING_TIME: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReliabilityKind {
    #[default]
    BestEffort,
    Reliable,
}

/// RELIABILITY policy.
///
/// `max_blocking_time` bounds how long a write may block on a full
/// KEEP_ALL reader before failing with TIMEOUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reliability {
    pub kind: ReliabilityKind,
    pub max_blocking_time: Duration,
}

impl Reliability {
    pub const fn best_effort() -> Self {
        Self {
            kind: ReliabilityKind::BestEffort,
            max_blocking_time: DEFAULT_MAX_BLOCKING_TIME,
        }
    }

    pub const fn reliable(max_blocking_time: Duration) -> Self {
        Self {
            kind: ReliabilityKind::Reliable,
            max_blocking_time,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.kind == ReliabilityKind::Reliable
    }
}

/// DURABILITY policy. Only VOLATILE has observable effect on local delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    #[default]
    Volatile,
    TransientLocal,
    Transient,
    Persistent,
}

/// HISTORY policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Keep the `depth` most recent samples per instance.
    KeepLast(u32),
    /// Keep everything up to the resource limits.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        History::KeepLast(1)
    }
}

/// RESOURCE_LIMITS policy; [`LENGTH_UNLIMITED`] disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: i32,
    pub max_instances: i32,
    pub max_samples_per_instance: i32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: LENGTH_UNLIMITED,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
        }
    }
}

impl ResourceLimits {
    /// Limit as an optional count; `None` when unlimited.
    pub(crate) fn limit(value: i32) -> Option<u32> {
        u32::try_from(value).ok()
    }
}

/// ENTITY_FACTORY policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityFactory {
    pub autoenable_created_entities: bool,
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self {
            autoenable_created_entities: true,
        }
    }
}

/// WRITER_DATA_LIFECYCLE policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterDataLifecycle {
    /// Dispose instances when the writer unregisters them (including on delete).
    pub autodispose_unregistered_instances: bool,
}

impl Default for WriterDataLifecycle {
    fn default() -> Self {
        Self {
            autodispose_unregistered_instances: true,
        }
    }
}

/// Sparse QoS policy set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Qos {
    pub reliability: Option<Reliability>,
    pub durability: Option<Durability>,
    pub history: Option<History>,
    pub resource_limits: Option<ResourceLimits>,
    pub user_data: Option<Vec<u8>>,
    pub topic_data: Option<Vec<u8>>,
    pub group_data: Option<Vec<u8>>,
    pub entity_factory: Option<EntityFactory>,
    pub writer_data_lifecycle: Option<WriterDataLifecycle>,
}

impl Qos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill every unset policy from `other`.
    pub fn merge_missing(&mut self, other: &Qos) {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if self.$field.is_none() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        fill!(
            reliability,
            durability,
            history,
            resource_limits,
            user_data,
            topic_data,
            group_data,
            entity_factory,
            writer_data_lifecycle
        );
    }

    /// Fully populated reader QoS: `user`, then `topic`, then reader defaults.
    pub(crate) fn for_reader(user: Option<&Qos>, topic: &Qos) -> Qos {
        let mut qos = user.cloned().unwrap_or_default();
        qos.merge_missing(topic);
        qos.merge_missing(&Qos {
            reliability: Some(Reliability::best_effort()),
            durability: Some(Durability::Volatile),
            history: Some(History::default()),
            resource_limits: Some(ResourceLimits::default()),
            ..Qos::default()
        });
        qos
    }

    /// Fully populated writer QoS: `user`, then `topic`, then writer defaults.
    pub(crate) fn for_writer(user: Option<&Qos>, topic: &Qos) -> Qos {
        let mut qos = user.cloned().unwrap_or_default();
        qos.merge_missing(topic);
        qos.merge_missing(&Qos {
            reliability: Some(Reliability::reliable(DEFAULT_MAX_BLOCKING_TIME)),
            durability: Some(Durability::Volatile),
            history: Some(History::default()),
            resource_limits: Some(ResourceLimits::default()),
            writer_data_lifecycle: Some(WriterDataLifecycle::default()),
            ..Qos::default()
        });
        qos
    }

    pub fn reliability_or_default(&self) -> Reliability {
        self.reliability.unwrap_or(Reliability::best_effort())
    }

    pub fn history_or_default(&self) -> History {
        self.history.unwrap_or_default()
    }

    pub fn resource_limits_or_default(&self) -> ResourceLimits {
        self.resource_limits.unwrap_or_default()
    }

    pub fn is_autoenable(&self) -> bool {
        self.entity_factory
            .unwrap_or_default()
            .autoenable_created_entities
    }

    pub fn is_autodispose(&self) -> bool {
        self.writer_data_lifecycle
            .unwrap_or_default()
            .autodispose_unregistered_instances
    }

    /// Check history against resource limits.
    pub(crate) fn validate(&self) -> Result<()> {
        let limits = self.resource_limits_or_default();
        let per_instance = ResourceLimits::limit(limits.max_samples_per_instance);
        let max_samples = ResourceLimits::limit(limits.max_samples);

        if let Some(History::KeepLast(depth)) = self.history {
            if depth < 1 {
                return Err(Error::InconsistentPolicy(
                    "history depth must be at least 1".into(),
                ));
            }
            if per_instance.is_some_and(|max| depth > max) {
                return Err(Error::InconsistentPolicy(format!(
                    "history depth {} exceeds max_samples_per_instance {}",
                    depth, limits.max_samples_per_instance
                )));
            }
        }
        if let (Some(max), Some(per)) = (max_samples, per_instance) {
            if max < per {
                return Err(Error::InconsistentPolicy(format!(
                    "max_samples {} is less than max_samples_per_instance {}",
                    max, per
                )));
            }
        }
        for value in [
            limits.max_samples,
            limits.max_instances,
            limits.max_samples_per_instance,
        ] {
            if value < LENGTH_UNLIMITED || value == 0 {
                return Err(Error::bad_param(format!("invalid resource limit {}", value)));
            }
        }
        Ok(())
    }

    /// Reject changes to policies that are fixed once the entity is enabled.
    pub(crate) fn check_mutable(&self, new: &Qos) -> Result<()> {
        let changed = |name: &str, differs: bool| {
            if differs {
                Err(Error::ImmutablePolicy(name.to_string()))
            } else {
                Ok(())
            }
        };
        changed(
            "reliability",
            new.reliability.is_some() && new.reliability != self.reliability,
        )?;
        changed(
            "durability",
            new.durability.is_some() && new.durability != self.durability,
        )?;
        changed("history", new.history.is_some() && new.history != self.history)?;
        changed(
            "resource_limits",
            new.resource_limits.is_some() && new.resource_limits != self.resource_limits,
        )?;
        Ok(())
    }
}
