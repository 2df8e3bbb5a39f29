// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent setters for [`Qos`].

use super::{
    Durability, EntityFactory, History, Qos, Reliability, ResourceLimits, WriterDataLifecycle,
};
use std::time::Duration;

impl Qos {
    /// Set RELIABLE reliability.
    pub fn reliable(mut self, max_blocking_time: Duration) -> Self {
        self.reliability = Some(Reliability::reliable(max_blocking_time));
        self
    }

    /// Set BEST_EFFORT reliability.
    pub fn best_effort(mut self) -> Self {
        self.reliability = Some(Reliability::best_effort());
        self
    }

    /// Set KEEP_LAST history depth.
    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = Some(History::KeepLast(depth));
        self
    }

    /// Set KEEP_ALL history policy.
    pub fn keep_all(mut self) -> Self {
        self.history = Some(History::KeepAll);
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = Some(durability);
        self
    }

    pub fn resource_limits(
        mut self,
        max_samples: i32,
        max_instances: i32,
        max_samples_per_instance: i32,
    ) -> Self {
        self.resource_limits = Some(ResourceLimits {
            max_samples,
            max_instances,
            max_samples_per_instance,
        });
        self
    }

    pub fn user_data(mut self, data: &[u8]) -> Self {
        self.user_data = Some(data.to_vec());
        self
    }

    pub fn topic_data(mut self, data: &[u8]) -> Self {
        self.topic_data = Some(data.to_vec());
        self
    }

    pub fn group_data(mut self, data: &[u8]) -> Self {
        self.group_data = Some(data.to_vec());
        self
    }

    /// Whether children are created enabled.
    pub fn autoenable(mut self, autoenable_created_entities: bool) -> Self {
        self.entity_factory = Some(EntityFactory {
            autoenable_created_entities,
        });
        self
    }

    /// Whether unregistering (or deleting the writer) disposes instances.
    pub fn autodispose(mut self, autodispose_unregistered_instances: bool) -> Self {
        self.writer_data_lifecycle = Some(WriterDataLifecycle {
            autodispose_unregistered_instances,
        });
        self
    }
}
