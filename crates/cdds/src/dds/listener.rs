// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS Listeners
//!
//! Listeners provide callback-based notification for entity status changes.
//! This is an alternative to the polling-based StatusCondition/WaitSet pattern.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cdds::dds::{self, Listener};
//!
//! let listener = Listener::new()
//!     .on_data_available(|reader| println!("data on {}", reader))
//!     .on_subscription_matched(|_, status| println!("{} writers", status.current_count));
//! let participant = dds::create_participant(0, None, Some(listener))?;
//! # Ok::<(), cdds::Error>(())
//! ```
//!
//! # Resolution
//!
//! A status is handled by the nearest entity, walking from the entity that
//! raised it up to its participant, whose listener has a callback for it.
//! DATA_ON_READERS takes precedence over DATA_AVAILABLE: when a subscriber
//! (or its participant) listens for it, readers do not get DATA_AVAILABLE
//! callbacks. A status that no listener handles is left set on the entity,
//! where status conditions and `read_status`/`take_status` observe it.
//!
//! # Thread Safety
//!
//! Callbacks run on the thread that caused the status change (typically a
//! writer delivering to a local reader) with no entity locks held, so they may
//! call back into the API.

use super::condition::StatusMask;
use super::entity::InstanceHandle;
use super::Entity;
use std::fmt;
use std::sync::Arc;

/// Topic status: another topic definition with the same name conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InconsistentTopicStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

/// Reader status: samples that were lost before reaching the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleLostStatus {
    /// Total cumulative count of lost samples.
    pub total_count: u32,
    /// Change in total_count since last read of the status.
    pub total_count_change: i32,
}

/// Reason why a sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRejectedReason {
    /// Sample was not rejected.
    #[default]
    NotRejected,
    /// max_instances reached.
    InstancesLimit,
    /// max_samples reached.
    SamplesLimit,
    /// max_samples_per_instance reached.
    SamplesPerInstanceLimit,
}

/// Reader status: samples refused because of resource limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleRejectedStatus {
    /// Total cumulative count of rejected samples.
    pub total_count: u32,
    /// Change in total_count since last read of the status.
    pub total_count_change: i32,
    /// Reason for the last rejection.
    pub last_reason: SampleRejectedReason,
    /// Instance of the last rejected sample.
    pub last_instance_handle: InstanceHandle,
}

/// Writer status: matching with local readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicationMatchedStatus {
    /// Total cumulative count of matched readers.
    pub total_count: u32,
    /// Change in total_count since last read of the status.
    pub total_count_change: i32,
    /// Current number of matched readers.
    pub current_count: u32,
    /// Change in current_count since last read of the status.
    pub current_count_change: i32,
    /// Instance handle of the last reader matched or unmatched.
    pub last_subscription_handle: InstanceHandle,
}

/// Reader status: matching with local writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionMatchedStatus {
    /// Total cumulative count of matched writers.
    pub total_count: u32,
    /// Change in total_count since last read of the status.
    pub total_count_change: i32,
    /// Current number of matched writers.
    pub current_count: u32,
    /// Change in current_count since last read of the status.
    pub current_count_change: i32,
    /// Instance handle of the last writer matched or unmatched.
    pub last_publication_handle: InstanceHandle,
}

impl InconsistentTopicStatus {
    pub(crate) fn record(&mut self) {
        self.total_count += 1;
        self.total_count_change += 1;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

impl SampleLostStatus {
    pub(crate) fn record(&mut self) {
        self.total_count += 1;
        self.total_count_change += 1;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

impl SampleRejectedStatus {
    pub(crate) fn record(&mut self, reason: SampleRejectedReason, instance: InstanceHandle) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.last_reason = reason;
        self.last_instance_handle = instance;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
    }
}

impl PublicationMatchedStatus {
    pub(crate) fn matched(&mut self, reader: InstanceHandle) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.current_count += 1;
        self.current_count_change += 1;
        self.last_subscription_handle = reader;
    }

    pub(crate) fn unmatched(&mut self, reader: InstanceHandle) {
        self.current_count = self.current_count.saturating_sub(1);
        self.current_count_change -= 1;
        self.last_subscription_handle = reader;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
        self.current_count_change = 0;
    }
}

impl SubscriptionMatchedStatus {
    pub(crate) fn matched(&mut self, writer: InstanceHandle) {
        self.total_count += 1;
        self.total_count_change += 1;
        self.current_count += 1;
        self.current_count_change += 1;
        self.last_publication_handle = writer;
    }

    pub(crate) fn unmatched(&mut self, writer: InstanceHandle) {
        self.current_count = self.current_count.saturating_sub(1);
        self.current_count_change -= 1;
        self.last_publication_handle = writer;
    }

    pub(crate) fn reset_changes(&mut self) {
        self.total_count_change = 0;
        self.current_count_change = 0;
    }
}

/// Callback receiving the entity the status applies to.
pub type EntityCallback = Arc<dyn Fn(Entity) + Send + Sync>;
/// Callback receiving the entity and a snapshot of its status.
pub type StatusCallback<S> = Arc<dyn Fn(Entity, S) + Send + Sync>;

/// Set of optional status callbacks.
///
/// Built fluently; every `on_*` method installs one callback. Cloning is
/// cheap (callbacks are shared).
#[derive(Clone, Default)]
pub struct Listener {
    pub(crate) inconsistent_topic: Option<StatusCallback<InconsistentTopicStatus>>,
    pub(crate) sample_lost: Option<StatusCallback<SampleLostStatus>>,
    pub(crate) sample_rejected: Option<StatusCallback<SampleRejectedStatus>>,
    pub(crate) data_on_readers: Option<EntityCallback>,
    pub(crate) data_available: Option<EntityCallback>,
    pub(crate) publication_matched: Option<StatusCallback<PublicationMatchedStatus>>,
    pub(crate) subscription_matched: Option<StatusCallback<SubscriptionMatchedStatus>>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_inconsistent_topic<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity, InconsistentTopicStatus) + Send + Sync + 'static,
    {
        self.inconsistent_topic = Some(Arc::new(f));
        self
    }

    pub fn on_sample_lost<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity, SampleLostStatus) + Send + Sync + 'static,
    {
        self.sample_lost = Some(Arc::new(f));
        self
    }

    pub fn on_sample_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity, SampleRejectedStatus) + Send + Sync + 'static,
    {
        self.sample_rejected = Some(Arc::new(f));
        self
    }

    /// Called with the subscriber when any of its readers has new data.
    pub fn on_data_on_readers<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity) + Send + Sync + 'static,
    {
        self.data_on_readers = Some(Arc::new(f));
        self
    }

    /// Called with the reader when it has new data.
    pub fn on_data_available<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity) + Send + Sync + 'static,
    {
        self.data_available = Some(Arc::new(f));
        self
    }

    pub fn on_publication_matched<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity, PublicationMatchedStatus) + Send + Sync + 'static,
    {
        self.publication_matched = Some(Arc::new(f));
        self
    }

    pub fn on_subscription_matched<F>(mut self, f: F) -> Self
    where
        F: Fn(Entity, SubscriptionMatchedStatus) + Send + Sync + 'static,
    {
        self.subscription_matched = Some(Arc::new(f));
        self
    }

    /// Install the callbacks of `other` that `self` does not have.
    pub fn merge(&mut self, other: &Listener) {
        fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if dst.is_none() {
                dst.clone_from(src);
            }
        }
        fill(&mut self.inconsistent_topic, &other.inconsistent_topic);
        fill(&mut self.sample_lost, &other.sample_lost);
        fill(&mut self.sample_rejected, &other.sample_rejected);
        fill(&mut self.data_on_readers, &other.data_on_readers);
        fill(&mut self.data_available, &other.data_available);
        fill(&mut self.publication_matched, &other.publication_matched);
        fill(&mut self.subscription_matched, &other.subscription_matched);
    }

    /// Statuses this listener has a callback for.
    pub fn mask(&self) -> StatusMask {
        let mut mask = StatusMask::NONE;
        let mut add = |present: bool, bit: StatusMask| {
            if present {
                mask = mask | bit;
            }
        };
        add(self.inconsistent_topic.is_some(), StatusMask::INCONSISTENT_TOPIC);
        add(self.sample_lost.is_some(), StatusMask::SAMPLE_LOST);
        add(self.sample_rejected.is_some(), StatusMask::SAMPLE_REJECTED);
        add(self.data_on_readers.is_some(), StatusMask::DATA_ON_READERS);
        add(self.data_available.is_some(), StatusMask::DATA_AVAILABLE);
        add(self.publication_matched.is_some(), StatusMask::PUBLICATION_MATCHED);
        add(self.subscription_matched.is_some(), StatusMask::SUBSCRIPTION_MATCHED);
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask().is_empty()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("mask", &format_args!("{:#x}", self.mask().bits()))
            .finish()
    }
}

/// First callback found walking `chain` (entity first, participant last).
pub(crate) fn find_callback<T: Clone>(
    chain: &[Listener],
    pick: impl Fn(&Listener) -> &Option<T>,
) -> Option<T> {
    chain.iter().find_map(|l| pick(l).clone())
}
