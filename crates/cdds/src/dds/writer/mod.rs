// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS DataWriter
//!
//! A writer turns application samples into serdata and stores them in the
//! history cache of every matched reader of its domain.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdds::dds::{self, Qos};
//! use std::time::Duration;
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
//! let qos = Qos::new().reliable(Duration::from_millis(100));
//! let writer = dds::create_writer(participant, topic, Some(&qos), None)?;
//!
//! dds::write(writer, &SensorData { value: 23.5 })?;
//! # Ok::<(), cdds::Error>(())
//! ```
//!
//! ## Delivery Path
//!
//! ```text
//! write() -> from_sample -> tkmap (instance id) -+-> rhc.store (reader 1)
//!                                                +-> rhc.store (reader 2)
//!                                                +-> ...
//! ```
//!
//! A reliable writer blocks on a full reliable KEEP_ALL reader for at most
//! `max_blocking_time`; on expiry the sample is lost for that reader, the
//! other readers still get it, and the write fails with TIMEOUT.
//!
//! ## Instances
//!
//! The writer keeps one instance-map reference per instance it registered.
//! Unregistering (explicitly, or by deleting the writer) drops it and, with
//! `autodispose_unregistered_instances`, disposes the instance first.

pub mod loan;

use super::allocator::DataAllocator;
use super::domain_registry::{BindToken, EndpointKind, MatchKey};
use super::entity::{self, EntityBody, EntityKind, EntityNode, InstanceHandle, NewEntity, HANDLE_NIL};
use super::listener::{Listener, PublicationMatchedStatus};
use super::qos::{Qos, Reliability};
use super::rhc::StoreOutcome;
use super::time::{self, Time};
use super::{publisher, reader, Entity, Error, Result, StatusMask};
use crate::config::RuntimeConfig;
use crate::core::handles::Pinned;
use crate::core::serdata::{
    SerdataKind, SerdataRef, SertypeRef, TopicType, STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Writer-specific part of a writer entity.
pub(crate) struct WriterBody {
    pub(crate) topic: Entity,
    topic_node: Arc<EntityNode>,
    pub(crate) sertype: SertypeRef,
    key: MatchKey,
    /// Registered instances and the key serdata holding their map reference.
    instances: Mutex<HashMap<InstanceHandle, SerdataRef>>,
    matched: Mutex<PublicationMatchedStatus>,
    reliability: Reliability,
    autodispose: bool,
    pub(crate) allocator: DataAllocator,
    /// Ids of loans handed out and not yet written or returned.
    pub(crate) loans: Arc<Mutex<HashSet<u64>>>,
    bind: Mutex<Option<BindToken>>,
}

impl WriterBody {
    pub(crate) fn registered_instances(&self) -> usize {
        self.instances.lock().len()
    }
}

/// Create a writer on `topic`.
///
/// `participant_or_publisher` may be a participant, in which case an
/// implicit publisher is created for the writer and deleted with it.
pub fn create_writer(
    participant_or_publisher: Entity,
    topic: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let parent = entity::pin(participant_or_publisher)?;
    let (publisher, implicit) = match parent.kind {
        EntityKind::Publisher => (parent.arc(), false),
        EntityKind::Participant => {
            let publisher = publisher::create_implicit(&parent.arc())?;
            (entity::pin(publisher)?.arc(), true)
        }
        _ => return Err(Error::IllegalOperation),
    };
    drop(parent);

    let created = build_writer(&publisher, topic, qos, listener);
    if created.is_err() && implicit {
        let _ = entity::delete(publisher.handle);
    }
    created
}

fn build_writer(
    publisher: &Arc<EntityNode>,
    topic: Entity,
    qos: Option<&Qos>,
    listener: Option<Listener>,
) -> Result<Entity> {
    let tp = entity::pin_kind(topic, EntityKind::Topic)?;
    if publisher.participant().handle != tp.participant().handle {
        return Err(Error::bad_param("topic belongs to another participant"));
    }
    let body = tp.topic()?;

    let mut user = qos.cloned().unwrap_or_default();
    user.merge_missing(&publisher.qos());
    user.merge_missing(&tp.qos());
    if user.reliability.is_none() {
        let blocking = RuntimeConfig::global().core().default_max_blocking_time;
        user.reliability = Some(Reliability::reliable(blocking));
    }
    let wqos = Qos::for_writer(Some(&user), &tp.qos());
    wqos.validate()?;

    let sertype = Arc::clone(&body.sertype);
    let key = MatchKey::from_names(&body.name, sertype.type_name());
    let reliability = wqos.reliability_or_default();
    let autodispose = wqos.is_autodispose();

    body.add_user();
    let created = entity::create_entity(
        NewEntity::child(EntityKind::Writer, publisher)
            .qos(wqos)
            .listener(listener),
        {
            let topic_node = tp.arc();
            move |_| {
                EntityBody::Writer(WriterBody {
                    topic,
                    topic_node,
                    sertype,
                    key,
                    instances: Mutex::new(HashMap::new()),
                    matched: Mutex::new(PublicationMatchedStatus::default()),
                    reliability,
                    autodispose,
                    allocator: DataAllocator::for_endpoint(),
                    loans: Arc::new(Mutex::new(HashSet::new())),
                    bind: Mutex::new(None),
                })
            }
        },
    );
    if created.is_err() {
        body.remove_user();
    }
    let writer = created?;
    log::debug!(
        "[writer] {} on '{}' reliable={} autodispose={}",
        writer,
        body.name,
        reliability.is_reliable(),
        autodispose
    );
    Ok(writer)
}

// ============================================================================
// Matching
// ============================================================================

/// Register an enabled writer with its domain and match existing readers.
pub(crate) fn on_enable(node: &Arc<EntityNode>) {
    let Ok(wr) = node.writer() else {
        return;
    };
    let (token, readers) =
        node.domain
            .register(wr.key.clone(), EndpointKind::Writer, wr.reliability, node);
    *wr.bind.lock() = Some(token);
    for rd in readers {
        reader::on_writer_matched(&rd, node.iid);
        on_reader_matched(node, rd.iid);
    }
}

pub(crate) fn on_reader_matched(node: &EntityNode, rd_iid: InstanceHandle) {
    let Ok(wr) = node.writer() else {
        return;
    };
    wr.matched.lock().matched(rd_iid);
    notify_matched(node, wr);
}

pub(crate) fn on_reader_unmatched(node: &EntityNode, rd_iid: InstanceHandle) {
    let Ok(wr) = node.writer() else {
        return;
    };
    wr.matched.lock().unmatched(rd_iid);
    notify_matched(node, wr);
}

fn notify_matched(node: &EntityNode, wr: &WriterBody) {
    entity::notify_status(
        node,
        StatusMask::PUBLICATION_MATCHED,
        |l| &l.publication_matched,
        || {
            let mut st = wr.matched.lock();
            let snapshot = *st;
            st.reset_changes();
            snapshot
        },
    );
}

/// Unregister every instance from the matched readers and leave the domain.
pub(crate) fn teardown(node: &Arc<EntityNode>) {
    let Ok(wr) = node.writer() else {
        return;
    };
    drop(wr.bind.lock().take());
    for rd_node in node.domain.find_readers(&wr.key, wr.reliability) {
        let Ok(rd) = rd_node.reader() else {
            continue;
        };
        let data_available = rd.rhc.lock().unregister_wr(node.iid, wr.autodispose);
        if data_available {
            entity::notify_data_available(&rd_node);
        }
        reader::on_writer_unmatched(&rd_node, node.iid);
    }

    let tkmap = node.domain.tkmap();
    let instances = std::mem::take(&mut *wr.instances.lock());
    for key in instances.values() {
        tkmap.unref(wr.sertype.type_name(), key.as_ref());
    }
    wr.loans.lock().clear();
    if let Ok(topic) = wr.topic_node.topic() {
        topic.remove_user();
    }
    log::debug!(
        "[writer] {} torn down, {} instance(s) unregistered",
        node.handle,
        instances.len()
    );
}

// ============================================================================
// Write path
// ============================================================================

/// Result of storing into one reader.
enum Stored {
    Outcome(StoreOutcome),
    /// Reader stayed full until the blocking deadline.
    Lost,
}

fn pin_writer(writer: Entity) -> Result<Pinned<'static, EntityNode>> {
    let node = entity::pin_kind(writer, EntityKind::Writer)?;
    node.ensure_enabled()?;
    Ok(node)
}

fn check_timestamp(ts: Time) -> Result<()> {
    if ts < 0 {
        Err(Error::bad_param(format!("invalid timestamp {}", ts)))
    } else {
        Ok(())
    }
}

fn serdata_of(wr: &WriterBody, kind: SerdataKind, sample: &dyn Any) -> Result<SerdataRef> {
    wr.sertype.from_sample(kind, sample)
}

/// Store `sd` in one reader, waiting for space while the reader blocks writers.
fn store_into(
    wr: &WriterBody,
    wr_iid: InstanceHandle,
    rd_node: &EntityNode,
    sd: &SerdataRef,
    iid: InstanceHandle,
    deadline: Option<Instant>,
) -> Stored {
    let Ok(rd) = rd_node.reader() else {
        return Stored::Outcome(StoreOutcome::NoChange);
    };
    let blocking = wr.reliability.is_reliable() && rd.blocks_writers();
    let mut rhc = rd.rhc.lock();
    loop {
        let outcome = rhc.store(wr_iid, sd, iid);
        if !blocking || !matches!(outcome, StoreOutcome::Rejected { .. }) {
            return Stored::Outcome(outcome);
        }
        if rd_node.state.lock().deleting {
            return Stored::Outcome(StoreOutcome::NoChange);
        }
        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return Stored::Lost;
                }
                let _ = rd.space.wait_until(&mut rhc, deadline);
            }
            None => rd.space.wait(&mut rhc),
        }
    }
}

/// Deliver `sd` to every matched reader and keep the instance registration
/// in step. Returns the instance id.
fn deliver(node: &EntityNode, sd: &SerdataRef) -> Result<InstanceHandle> {
    let wr = node.writer()?;
    let tkmap = node.domain.tkmap();
    let type_name = wr.sertype.type_name();
    let unregister = sd.statusinfo() & STATUSINFO_UNREGISTER != 0;

    // delivery reference, dropped once every reader has the sample
    let iid = tkmap.lookup_or_register(type_name, sd.as_ref());
    let released = {
        let mut instances = wr.instances.lock();
        if unregister {
            instances.remove(&iid)
        } else {
            if let Entry::Vacant(slot) = instances.entry(iid) {
                tkmap.ref_iid(iid);
                slot.insert(sd.to_untyped());
            }
            None
        }
    };

    let deadline = time::deadline_after(wr.reliability.max_blocking_time);
    let mut timed_out = false;
    for rd_node in node.domain.find_readers(&wr.key, wr.reliability) {
        match store_into(wr, node.iid, &rd_node, sd, iid, deadline) {
            Stored::Outcome(StoreOutcome::Delivered) => entity::notify_data_available(&rd_node),
            Stored::Outcome(StoreOutcome::NoChange) => {}
            Stored::Outcome(StoreOutcome::Rejected { reason, instance }) => {
                log::warn!(
                    "[writer] {} sample for instance {:#x} rejected by reader {}: {:?}",
                    node.handle,
                    instance,
                    rd_node.handle,
                    reason
                );
                if let Ok(rd) = rd_node.reader() {
                    rd.record_rejected(reason, instance);
                }
                reader::notify_rejected(&rd_node);
            }
            Stored::Lost => {
                log::warn!(
                    "[writer] {} timed out waiting for reader {}",
                    node.handle,
                    rd_node.handle
                );
                if let Ok(rd) = rd_node.reader() {
                    rd.record_lost();
                }
                reader::notify_lost(&rd_node);
                timed_out = true;
            }
        }
    }

    tkmap.unref(type_name, sd.as_ref());
    if let Some(key) = released {
        tkmap.unref(type_name, key.as_ref());
    }
    if timed_out {
        Err(Error::Timeout)
    } else {
        Ok(iid)
    }
}

fn write_impl(
    writer: Entity,
    sample: &dyn Any,
    kind: SerdataKind,
    statusinfo: u32,
    ts: Time,
) -> Result<InstanceHandle> {
    check_timestamp(ts)?;
    let node = pin_writer(writer)?;
    let sd = serdata_of(node.writer()?, kind, sample)?;
    sd.set_timestamp(ts);
    sd.set_statusinfo(statusinfo);
    deliver(&node, &sd)
}

fn unregister_bits(node: &EntityNode) -> Result<u32> {
    let mut statusinfo = STATUSINFO_UNREGISTER;
    if node.writer()?.autodispose {
        statusinfo |= STATUSINFO_DISPOSE;
    }
    Ok(statusinfo)
}

/// Key serdata of an instance known to the domain's instance map.
fn instance_key(node: &EntityNode, ih: InstanceHandle) -> Result<SerdataRef> {
    if ih == HANDLE_NIL {
        return Err(Error::precondition("instance handle is nil"));
    }
    node.domain
        .tkmap()
        .get(ih)
        .ok_or_else(|| Error::precondition(format!("unknown instance {:#x}", ih)))
}

fn key_write(node: &EntityNode, key: &SerdataRef, statusinfo: u32, ts: Time) -> Result<()> {
    let sd = key.to_untyped();
    sd.set_timestamp(ts);
    sd.set_statusinfo(statusinfo);
    deliver(node, &sd).map(|_| ())
}

/// Publish a sample stamped with the current time.
pub fn write<T: TopicType>(writer: Entity, sample: &T) -> Result<()> {
    write_ts(writer, sample, time::time_now())
}

/// Publish a sample with an explicit source timestamp.
pub fn write_ts<T: TopicType>(writer: Entity, sample: &T, ts: Time) -> Result<()> {
    write_impl(writer, sample, SerdataKind::Data, 0, ts).map(|_| ())
}

/// Publish a sample and dispose its instance in one step.
pub fn writedispose<T: TopicType>(writer: Entity, sample: &T) -> Result<()> {
    writedispose_ts(writer, sample, time::time_now())
}

pub fn writedispose_ts<T: TopicType>(writer: Entity, sample: &T, ts: Time) -> Result<()> {
    write_impl(writer, sample, SerdataKind::Data, STATUSINFO_DISPOSE, ts).map(|_| ())
}

/// Dispose the instance whose key fields `sample` carries.
pub fn dispose<T: TopicType>(writer: Entity, sample: &T) -> Result<()> {
    dispose_ts(writer, sample, time::time_now())
}

pub fn dispose_ts<T: TopicType>(writer: Entity, sample: &T, ts: Time) -> Result<()> {
    write_impl(writer, sample, SerdataKind::Key, STATUSINFO_DISPOSE, ts).map(|_| ())
}

/// Dispose an instance by handle.
pub fn dispose_ih(writer: Entity, instance: InstanceHandle) -> Result<()> {
    let node = pin_writer(writer)?;
    let key = instance_key(&node, instance)?;
    key_write(&node, &key, STATUSINFO_DISPOSE, time::time_now())
}

/// Register the instance of `sample` with the writer without publishing data.
pub fn register_instance<T: TopicType>(writer: Entity, sample: &T) -> Result<InstanceHandle> {
    let node = pin_writer(writer)?;
    let wr = node.writer()?;
    let key = serdata_of(wr, SerdataKind::Key, sample)?;
    let tkmap = node.domain.tkmap();
    let iid = tkmap.lookup_or_register(wr.sertype.type_name(), key.as_ref());
    match wr.instances.lock().entry(iid) {
        Entry::Vacant(slot) => {
            slot.insert(key);
        }
        Entry::Occupied(_) => tkmap.unref(wr.sertype.type_name(), key.as_ref()),
    }
    Ok(iid)
}

/// Unregister the instance of `sample`; disposes it first when the writer
/// auto-disposes unregistered instances.
pub fn unregister_instance<T: TopicType>(writer: Entity, sample: &T) -> Result<()> {
    unregister_instance_ts(writer, sample, time::time_now())
}

pub fn unregister_instance_ts<T: TopicType>(writer: Entity, sample: &T, ts: Time) -> Result<()> {
    check_timestamp(ts)?;
    let node = pin_writer(writer)?;
    let statusinfo = unregister_bits(&node)?;
    drop(node);
    write_impl(writer, sample, SerdataKind::Key, statusinfo, ts).map(|_| ())
}

pub fn unregister_instance_ih(writer: Entity, instance: InstanceHandle) -> Result<()> {
    let node = pin_writer(writer)?;
    let key = instance_key(&node, instance)?;
    let statusinfo = unregister_bits(&node)?;
    key_write(&node, &key, statusinfo, time::time_now())
}

/// Publish pre-built serdata of the writer's type.
///
/// The serdata keeps its status info; its timestamp is set to now.
pub fn write_cdr(writer: Entity, serdata: SerdataRef) -> Result<()> {
    let node = pin_writer(writer)?;
    let wr = node.writer()?;
    let same_type = serdata
        .sertype()
        .is_some_and(|st| st.equal(wr.sertype.as_ref()));
    if !same_type {
        return Err(Error::bad_param("serdata is not of the writer's type"));
    }
    serdata.set_timestamp(time::time_now());
    deliver(&node, &serdata).map(|_| ())
}

fn endpoint_sertype(node: &EntityNode) -> Result<&SertypeRef> {
    match &node.body {
        EntityBody::Reader(rd) => Ok(&rd.sertype),
        EntityBody::Writer(wr) => Ok(&wr.sertype),
        _ => Err(Error::IllegalOperation),
    }
}

/// Instance handle for the key of `sample`, [`HANDLE_NIL`] if the domain
/// has no such instance. Accepts readers and writers.
pub fn lookup_instance<T: TopicType>(entity: Entity, sample: &T) -> Result<InstanceHandle> {
    let node = entity::pin(entity)?;
    let sertype = endpoint_sertype(&node)?;
    let key = sertype.from_sample(SerdataKind::Key, sample as &dyn Any)?;
    Ok(node
        .domain
        .tkmap()
        .lookup(sertype.type_name(), key.as_ref())
        .unwrap_or(HANDLE_NIL))
}

/// Fill the key fields of `sample` from an instance handle; other fields
/// are reset to their defaults.
pub fn instance_get_key<T: TopicType>(
    entity: Entity,
    instance: InstanceHandle,
    sample: &mut T,
) -> Result<()> {
    let node = entity::pin(entity)?;
    endpoint_sertype(&node)?;
    let key = node
        .domain
        .tkmap()
        .get(instance)
        .ok_or_else(|| Error::bad_param(format!("unknown instance {:#x}", instance)))?;
    *sample = T::default();
    key.untyped_to_sample(sample as &mut dyn Any)
}

/// Wait until matched reliable readers acknowledged everything written.
///
/// Delivery to local readers completes inside `write`, so this only checks
/// the entity: a writer, or a publisher (covering all its writers).
pub fn wait_for_acks(entity: Entity, timeout: Duration) -> Result<()> {
    let node = entity::pin(entity)?;
    match node.kind {
        EntityKind::Writer | EntityKind::Publisher => node.ensure_enabled()?,
        _ => return Err(Error::IllegalOperation),
    }
    log::trace!("[writer] wait_for_acks on {} ({:?})", entity, timeout);
    Ok(())
}

pub fn get_publication_matched_status(writer: Entity) -> Result<PublicationMatchedStatus> {
    let node = entity::pin_kind(writer, EntityKind::Writer)?;
    let wr = node.writer()?;
    let snapshot = {
        let mut st = wr.matched.lock();
        let snapshot = *st;
        st.reset_changes();
        snapshot
    };
    node.status.reset(StatusMask::PUBLICATION_MATCHED);
    Ok(snapshot)
}
