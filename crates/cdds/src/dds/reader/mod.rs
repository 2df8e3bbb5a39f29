// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS DataReader
//!
//! A reader owns a [`ReaderHistoryCache`] that matched local writers deliver
//! into. The application drains it through the read/take family in
//! [`read`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdds::dds::{self, Qos};
//! # use cdds::core::ser::{Cursor, CdrWriter, SerResult};
//! # #[derive(Default, Clone)] struct SensorData { value: f64 }
//! # impl cdds::core::serdata::TopicType for SensorData {
//! #     fn type_name() -> &'static str { "SensorData" }
//! #     fn encode(&self, w: &mut CdrWriter) -> SerResult<()> { w.write_f64(self.value) }
//! #     fn decode(r: &mut Cursor<'_>) -> SerResult<Self> { Ok(Self { value: r.read_f64()? }) }
//! # }
//!
//! let participant = dds::create_participant(0, None, None)?;
//! let topic = dds::create_topic::<SensorData>(participant, "sensors/temperature", None, None)?;
//! let qos = Qos::new().keep_last(8);
//! let reader = dds::create_reader(participant, topic, Some(&qos), None)?;
//!
//! let mut samples = vec![SensorData::default(); 8];
//! let mut infos = vec![dds::SampleInfo::default(); 8];
//! let n = dds::take(reader, &mut samples, &mut infos, 8)?;
//! println!("Got {} samples", n);
//! # Ok::<(), cdds::Error>(())
//! ```
//!
//! ## Reliability
//!
//! A reliable KEEP_ALL reader makes reliable writers block (up to their
//! `max_blocking_time`) when its resource limits are reached, instead of
//! rejecting the sample. The `space` condvar is signalled on every take.

pub mod read;
#[cfg(test)]
mod tests;

use super::domain_registry::{BindToken, EndpointKind, MatchKey};
use super::entity::{self, EntityBody, EntityKind, EntityNode, InstanceHandle, NewEntity};
use super::listener::{
    Listener, SampleLostStatus, SampleRejectedStatus, SubscriptionMatchedStatus,
};
use super::qos::{History, Qos, Reliability};
use super::rhc::ReaderHistoryCache;
use super::{subscriber, writer, Entity, Error, Result, StatusMask};
use crate::core::serdata::SertypeRef;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::Arc;

#[derive(Default)]
struct ReaderStatuses {
    sample_lost: SampleLostStatus,
    sample_rejected: SampleRejectedStatus,
    subscription_matched: SubscriptionMatchedStatus,
}

/// Sample buffer a reader lends out, one loan at a time.
#[derive(Default)]
pub(crate) struct LoanCache {
    /// Buffers of the last returned loan, kept for reuse.
    pub(crate) buffer: Option<Box<dyn Any + Send>>,
    /// Id of the loan currently out, if any.
    pub(crate) outstanding: Option<u64>,
}

/// Reader-specific part of a reader entity.
pub(crate) struct ReaderBody {
    pub(crate) topic: Entity,
    topic_node: Arc<EntityNode>,
    pub(crate) sertype: SertypeRef,
    pub(crate) key: MatchKey,
    pub(crate) rhc: Mutex<ReaderHistoryCache>,
    /// Signalled when samples are taken.
    pub(crate) space: Condvar,
    statuses: Mutex<ReaderStatuses>,
    pub(crate) loan: Mutex<LoanCache>,
    pub(crate) reliability: Reliability,
    keep_all: bool,
    bind: Mutex<Option<BindToken>>,
}

impl ReaderBody {
    /// Writers may block on this reader instead of having samples rejected.
    pub(crate) fn blocks_writers(&self) -> bool {
        self.reliability.is_reliable() && self.keep_all
    }

    pub(crate) fn record_rejected(&self, reason: super::SampleRejectedReason, instance: InstanceHandle) {
        self.statuses.lock().sample_rejected.record(reason, instance);
    }

    pub(crate) fn record_lost(&self) {
        self.statuses.lock().sample_lost.record();
    }
}

/// Create a reader on `topic`.
///
/// `participant_or_subscriber` may be a participant, in which case an
/// implicit subscriber is created for the reader and deleted with it.
pub fn create_reader(
    participant_or_subscriber: Entity,
    topic: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let parent = entity::pin(participant_or_subscriber)?;
    let (sub, implicit) = match parent.kind {
        EntityKind::Subscriber => (parent.arc(), false),
        EntityKind::Participant => {
            let sub = subscriber::create_implicit(&parent.arc())?;
            let node = entity::pin(sub)?.arc();
            (node, true)
        }
        _ => return Err(Error::IllegalOperation),
    };
    drop(parent);

    let created = build_reader(&sub, topic, qos, listener);
    if created.is_err() && implicit {
        let _ = entity::delete(sub.handle);
    }
    created
}

fn build_reader(
    sub: &Arc<EntityNode>,
    topic: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let tp = entity::pin_kind(topic, EntityKind::Topic)?;
    if sub.participant().handle != tp.participant().handle {
        return Err(Error::bad_param("topic belongs to another participant"));
    }
    let body = tp.topic()?;

    let mut user = qos.cloned().unwrap_or_default();
    user.merge_missing(&sub.qos());
    let rqos = Qos::for_reader(Some(&user), &tp.qos());
    rqos.validate()?;

    let sertype = Arc::clone(&body.sertype);
    let key = MatchKey::from_names(&body.name, sertype.type_name());
    let rhc = ReaderHistoryCache::new(Arc::clone(&sertype), &rqos, Arc::clone(sub.domain.tkmap()));
    let reliability = rqos.reliability_or_default();
    let keep_all = matches!(rqos.history_or_default(), History::KeepAll);

    body.add_user();
    let topic_node = tp.arc();
    let created = entity::create_entity(
        NewEntity::child(EntityKind::Reader, sub)
            .qos(rqos)
            .listener(listener),
        {
            let topic_node = Arc::clone(&topic_node);
            move |_| {
                EntityBody::Reader(ReaderBody {
                    topic,
                    topic_node,
                    sertype,
                    key,
                    rhc: Mutex::new(rhc),
                    space: Condvar::new(),
                    statuses: Mutex::new(ReaderStatuses::default()),
                    loan: Mutex::new(LoanCache::default()),
                    reliability,
                    keep_all,
                    bind: Mutex::new(None),
                })
            }
        },
    );
    if created.is_err() {
        body.remove_user();
    }
    let reader = created?;
    log::debug!(
        "[reader] {} on '{}' reliable={} keep_all={}",
        reader,
        body.name,
        reliability.is_reliable(),
        keep_all
    );
    Ok(reader)
}

/// Register an enabled reader with its domain and match existing writers.
pub(crate) fn on_enable(node: &Arc<EntityNode>) {
    let Ok(rd) = node.reader() else {
        return;
    };
    let (token, writers) =
        node.domain
            .register(rd.key.clone(), EndpointKind::Reader, rd.reliability, node);
    *rd.bind.lock() = Some(token);
    for wr in writers {
        writer::on_reader_matched(&wr, node.iid);
        on_writer_matched(node, wr.iid);
    }
}

pub(crate) fn on_writer_matched(node: &EntityNode, wr_iid: InstanceHandle) {
    let Ok(rd) = node.reader() else {
        return;
    };
    rd.statuses.lock().subscription_matched.matched(wr_iid);
    notify_matched(node, rd);
}

pub(crate) fn on_writer_unmatched(node: &EntityNode, wr_iid: InstanceHandle) {
    let Ok(rd) = node.reader() else {
        return;
    };
    rd.statuses.lock().subscription_matched.unmatched(wr_iid);
    notify_matched(node, rd);
}

fn notify_matched(node: &EntityNode, rd: &ReaderBody) {
    entity::notify_status(
        node,
        StatusMask::SUBSCRIPTION_MATCHED,
        |l| &l.subscription_matched,
        || {
            let mut st = rd.statuses.lock();
            let snapshot = st.subscription_matched;
            st.subscription_matched.reset_changes();
            snapshot
        },
    );
}

/// Raise SAMPLE_REJECTED on a reader (or hand it to a listener).
pub(crate) fn notify_rejected(node: &EntityNode) {
    let Ok(rd) = node.reader() else {
        return;
    };
    entity::notify_status(
        node,
        StatusMask::SAMPLE_REJECTED,
        |l| &l.sample_rejected,
        || {
            let mut st = rd.statuses.lock();
            let snapshot = st.sample_rejected;
            st.sample_rejected.reset_changes();
            snapshot
        },
    );
}

/// Raise SAMPLE_LOST on a reader (or hand it to a listener).
pub(crate) fn notify_lost(node: &EntityNode) {
    let Ok(rd) = node.reader() else {
        return;
    };
    entity::notify_status(
        node,
        StatusMask::SAMPLE_LOST,
        |l| &l.sample_lost,
        || {
            let mut st = rd.statuses.lock();
            let snapshot = st.sample_lost;
            st.sample_lost.reset_changes();
            snapshot
        },
    );
}

/// Unregister from the domain and unmatch the writers still present.
pub(crate) fn teardown(node: &Arc<EntityNode>) {
    let Ok(rd) = node.reader() else {
        return;
    };
    drop(rd.bind.lock().take());
    for wr in node
        .domain
        .peers(&rd.key, EndpointKind::Writer, rd.reliability)
    {
        writer::on_reader_unmatched(&wr, node.iid);
    }
    if let Ok(topic) = rd.topic_node.topic() {
        topic.remove_user();
    }
    *rd.loan.lock() = LoanCache::default();
    // Wake writers blocked on this reader; they see the reader gone and give up.
    rd.space.notify_all();
}

fn with_statuses<S>(
    reader: Entity,
    bit: StatusMask,
    f: impl FnOnce(&mut ReaderStatuses) -> S,
) -> Result<S> {
    let node = entity::pin_kind(reader, EntityKind::Reader)?;
    let rd = node.reader()?;
    let value = f(&mut rd.statuses.lock());
    node.status.reset(bit);
    Ok(value)
}

pub fn get_sample_lost_status(reader: Entity) -> Result<SampleLostStatus> {
    with_statuses(reader, StatusMask::SAMPLE_LOST, |st| {
        let snapshot = st.sample_lost;
        st.sample_lost.reset_changes();
        snapshot
    })
}

pub fn get_sample_rejected_status(reader: Entity) -> Result<SampleRejectedStatus> {
    with_statuses(reader, StatusMask::SAMPLE_REJECTED, |st| {
        let snapshot = st.sample_rejected;
        st.sample_rejected.reset_changes();
        snapshot
    })
}

pub fn get_subscription_matched_status(reader: Entity) -> Result<SubscriptionMatchedStatus> {
    with_statuses(reader, StatusMask::SUBSCRIPTION_MATCHED, |st| {
        let snapshot = st.subscription_matched;
        st.subscription_matched.reset_changes();
        snapshot
    })
}
