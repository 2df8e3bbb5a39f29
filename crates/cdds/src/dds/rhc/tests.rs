// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::core::handles::Handle;
use crate::core::ser::{CdrWriter, Cursor, SerResult};
use crate::core::serdata::{DefaultSertype, Sertype, TopicType};
use crate::dds::read_condition::{QueryFilter, SampleFilter};
use crate::dds::Entity;

const W1: InstanceHandle = 0x1001;
const W2: InstanceHandle = 0x1002;

#[derive(Debug, Default, Clone, PartialEq)]
struct Point {
    id: u32,
    x: i32,
}

impl TopicType for Point {
    fn type_name() -> &'static str {
        "Test::Point"
    }
    fn has_key() -> bool {
        true
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.id)?;
        w.write_i32(self.x)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self {
            id: r.read_u32()?,
            x: r.read_i32()?,
        })
    }
    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.id)
    }
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        self.id = r.read_u32()?;
        Ok(())
    }
}

struct Fixture {
    st: Arc<DefaultSertype<Point>>,
    tkmap: Arc<TopicKeyMap>,
    rhc: ReaderHistoryCache,
    ts: Time,
}

impl Fixture {
    fn new(qos: Qos) -> Self {
        let st = DefaultSertype::<Point>::new();
        let tkmap = Arc::new(TopicKeyMap::new());
        let sertype: SertypeRef = st.clone();
        let rhc = ReaderHistoryCache::new(sertype, &qos, Arc::clone(&tkmap));
        Self {
            st,
            tkmap,
            rhc,
            ts: 1_000,
        }
    }

    fn serdata(&mut self, kind: SerdataKind, id: u32, x: i32, statusinfo: u32) -> SerdataRef {
        let sd = self
            .st
            .from_sample(kind, &Point { id, x })
            .expect("from_sample");
        self.ts += 1;
        sd.set_timestamp(self.ts);
        sd.set_statusinfo(statusinfo);
        sd
    }

    /// Deliver the way a writer does: hold an instance reference while storing.
    fn deliver(&mut self, wr: InstanceHandle, sd: SerdataRef) -> StoreOutcome {
        let iid = self.tkmap.lookup_or_register(Point::type_name(), sd.as_ref());
        let outcome = self.rhc.store(wr, &sd, iid);
        self.tkmap.unref(Point::type_name(), sd.as_ref());
        outcome
    }

    fn write(&mut self, wr: InstanceHandle, id: u32, x: i32) -> StoreOutcome {
        let sd = self.serdata(SerdataKind::Data, id, x, 0);
        self.deliver(wr, sd)
    }

    fn key_op(&mut self, wr: InstanceHandle, id: u32, statusinfo: u32) -> StoreOutcome {
        let sd = self.serdata(SerdataKind::Key, id, 0, statusinfo);
        self.deliver(wr, sd)
    }

    fn dispose(&mut self, wr: InstanceHandle, id: u32) -> StoreOutcome {
        self.key_op(wr, id, STATUSINFO_DISPOSE)
    }

    fn unregister(&mut self, wr: InstanceHandle, id: u32) -> StoreOutcome {
        self.key_op(wr, id, STATUSINFO_UNREGISTER)
    }

    fn iid(&self, id: u32) -> InstanceHandle {
        let key = self
            .st
            .from_sample(SerdataKind::Key, &Point { id, x: 0 })
            .expect("key");
        self.tkmap
            .lookup(Point::type_name(), key.as_ref())
            .expect("instance registered")
    }
}

fn values(results: &[ReadResult]) -> Vec<i32> {
    results
        .iter()
        .filter(|(_, info)| info.valid_data)
        .map(|(sd, _)| {
            let mut p = Point::default();
            sd.to_sample(&mut p).expect("to_sample");
            p.x
        })
        .collect()
}

#[test]
fn test_keep_last_replaces_oldest() {
    let mut f = Fixture::new(Qos::new().keep_last(2));
    for x in 1..=3 {
        assert_eq!(f.write(W1, 1, x), StoreOutcome::Delivered);
    }
    assert_eq!(f.rhc.sample_count(), 2);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(values(&got), vec![2, 3]);
    assert_eq!(got[0].1.sample_rank, 1);
    assert_eq!(got[1].1.sample_rank, 0);
}

#[test]
fn test_read_marks_samples_read_and_instance_not_new() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 10);
    let first = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(first.len(), 1);
    let info = first[0].1;
    assert_eq!(info.sample_state, SampleState::NotRead);
    assert_eq!(info.view_state, ViewState::New);
    assert_eq!(info.instance_state, InstanceState::Alive);
    assert_eq!(info.publication_handle, W1);
    assert_eq!(info.instance_handle, f.iid(1));
    assert!(info.valid_data);

    assert!(f.rhc.read(10, ReadMask::NOT_READ, None, None).is_empty());
    let again = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(again[0].1.sample_state, SampleState::Read);
    assert_eq!(again[0].1.view_state, ViewState::NotNew);
}

#[test]
fn test_take_removes_samples() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.write(W1, 2, 2);
    f.write(W1, 1, 3);
    let taken = f.rhc.take(2, ReadMask::ANY, None, None);
    assert_eq!(taken.len(), 2);
    assert_eq!(f.rhc.sample_count(), 1);
    let rest = f.rhc.take(10, ReadMask::ANY, None, None);
    assert_eq!(rest.len(), 1);
    assert_eq!(f.rhc.sample_count(), 0);
    // instances with live writers survive being emptied
    assert_eq!(f.rhc.instance_count(), 2);
}

#[test]
fn test_results_are_grouped_per_instance_oldest_first() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.write(W1, 2, 2);
    f.write(W1, 1, 3);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    let handles: Vec<_> = got.iter().map(|(_, i)| i.instance_handle).collect();
    assert_eq!(handles[0], handles[1]);
    assert_ne!(handles[1], handles[2]);
    let first_instance: Vec<i32> = values(&got[..2]);
    assert_eq!(first_instance, vec![1, 3]);
}

#[test]
fn test_read_single_instance() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.write(W1, 2, 2);
    let iid = f.iid(2);
    let got = f.rhc.read(10, ReadMask::ANY, Some(iid), None);
    assert_eq!(values(&got), vec![2]);
    assert!(f.rhc.contains_instance(iid));
    assert!(!f.rhc.contains_instance(0xdead));
    assert!(f.rhc.read(10, ReadMask::ANY, Some(0xdead), None).is_empty());
}

#[test]
fn test_explicit_register_and_unknown_unregister_are_ignored() {
    let mut f = Fixture::new(Qos::new());
    assert_eq!(f.key_op(W1, 1, 0), StoreOutcome::NoChange);
    assert_eq!(f.unregister(W1, 1), StoreOutcome::NoChange);
    assert_eq!(f.rhc.instance_count(), 0);
}

#[test]
fn test_dispose_of_unknown_instance_creates_it_disposed() {
    let mut f = Fixture::new(Qos::new());
    assert_eq!(f.dispose(W1, 5), StoreOutcome::Delivered);
    assert_eq!(f.rhc.instance_count(), 1);
    assert_eq!(f.rhc.invalid_sample_count(), 1);

    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(got.len(), 1);
    let (sd, info) = &got[0];
    assert!(!info.valid_data);
    assert_eq!(info.instance_state, InstanceState::NotAliveDisposed);
    assert_eq!(info.absolute_generation_rank, 0);
    let mut key = Point::default();
    sd.untyped_to_sample(&mut key).expect("key");
    assert_eq!(key.id, 5);
}

#[test]
fn test_dispose_of_unread_instance_keeps_samples() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 7);
    f.dispose(W1, 1);
    assert_eq!(f.rhc.invalid_sample_count(), 0);
    let got = f.rhc.take(10, ReadMask::ANY, None, None);
    assert_eq!(values(&got), vec![7]);
    assert_eq!(got[0].1.instance_state, InstanceState::NotAliveDisposed);
    // still registered by W1
    assert_eq!(f.rhc.instance_count(), 1);
    // last writer leaves an empty disposed instance: dropped
    f.unregister(W1, 1);
    assert_eq!(f.rhc.instance_count(), 0);
}

#[test]
fn test_dispose_after_take_adds_invalid_sample() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.rhc.take(10, ReadMask::ANY, None, None);
    assert_eq!(f.dispose(W1, 1), StoreOutcome::Delivered);
    let got = f.rhc.take(10, ReadMask::NOT_ALIVE_DISPOSED, None, None);
    assert_eq!(got.len(), 1);
    assert!(!got[0].1.valid_data);
}

#[test]
fn test_unregister_last_writer_with_unread_sample() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.unregister(W1, 1);
    assert_eq!(f.rhc.invalid_sample_count(), 0);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].1.instance_state, InstanceState::NotAliveNoWriters);
}

#[test]
fn test_unregister_last_writer_after_read_adds_invalid_sample() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(f.unregister(W1, 1), StoreOutcome::Delivered);
    let got = f.rhc.read(10, ReadMask::NOT_READ, None, None);
    assert_eq!(got.len(), 1);
    assert!(!got[0].1.valid_data);
    assert_eq!(got[0].1.instance_state, InstanceState::NotAliveNoWriters);

    // taking everything from a writerless instance drops it
    f.rhc.take(10, ReadMask::ANY, None, None);
    assert_eq!(f.rhc.instance_count(), 0);
}

#[test]
fn test_instance_stays_alive_while_a_writer_remains() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.write(W2, 1, 2);
    f.unregister(W1, 1);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert!(got
        .iter()
        .all(|(_, i)| i.instance_state == InstanceState::Alive));
    f.unregister(W2, 1);
    let got = f.rhc.read(10, ReadMask::NOT_ALIVE_NO_WRITERS, None, None);
    assert_eq!(got.len(), 3, "two samples plus the invalid sample");
}

#[test]
fn test_generation_counts_and_ranks() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.dispose(W1, 1);
    f.write(W1, 1, 2);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(values(&got), vec![1, 2]);
    let (a, b) = (got[0].1, got[1].1);
    assert_eq!(a.disposed_generation_count, 0);
    assert_eq!(b.disposed_generation_count, 1);
    assert_eq!(a.generation_rank, 1);
    assert_eq!(b.generation_rank, 0);
    assert_eq!(a.absolute_generation_rank, 1);
    assert_eq!(b.absolute_generation_rank, 0);
    assert_eq!(b.view_state, ViewState::New);
    assert_eq!(b.instance_state, InstanceState::Alive);
}

#[test]
fn test_no_writers_generation_after_reregistration() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.rhc.read(10, ReadMask::ANY, None, None);
    f.unregister(W1, 1);
    f.write(W2, 1, 2);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    let last = got.last().expect("samples").1;
    assert!(last.valid_data);
    assert_eq!(last.no_writers_generation_count, 1);
    assert_eq!(last.view_state, ViewState::New);
    assert_eq!(f.rhc.invalid_sample_count(), 0);
}

#[test]
fn test_samples_per_instance_limit_rejects() {
    let mut f = Fixture::new(Qos::new().keep_all().resource_limits(-1, -1, 2));
    f.write(W1, 1, 1);
    f.write(W1, 1, 2);
    let iid = f.iid(1);
    assert_eq!(
        f.write(W1, 1, 3),
        StoreOutcome::Rejected {
            reason: SampleRejectedReason::SamplesPerInstanceLimit,
            instance: iid,
        }
    );
    assert_eq!(f.rhc.sample_count(), 2);
    // other instances are unaffected
    assert_eq!(f.write(W1, 2, 1), StoreOutcome::Delivered);
}

#[test]
fn test_samples_and_instances_limits_reject() {
    let mut f = Fixture::new(Qos::new().keep_all().resource_limits(2, 2, -1));
    f.write(W1, 1, 1);
    f.write(W1, 2, 1);
    assert!(matches!(
        f.write(W1, 1, 2),
        StoreOutcome::Rejected {
            reason: SampleRejectedReason::SamplesLimit,
            ..
        }
    ));
    assert!(matches!(
        f.write(W1, 3, 1),
        StoreOutcome::Rejected {
            reason: SampleRejectedReason::InstancesLimit,
            ..
        }
    ));
    assert_eq!(f.rhc.instance_count(), 2);
}

#[test]
fn test_rejected_write_does_not_revive_disposed_instance() {
    let mut f = Fixture::new(Qos::new().keep_all().resource_limits(-1, -1, 1));
    f.write(W1, 1, 1);
    f.dispose(W1, 1);
    assert!(matches!(f.write(W1, 1, 2), StoreOutcome::Rejected { .. }));
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(got[0].1.instance_state, InstanceState::NotAliveDisposed);
    assert_eq!(got[0].1.disposed_generation_count, 0);
}

#[test]
fn test_rejected_write_keeps_last_writer() {
    let mut f = Fixture::new(Qos::new().keep_all().resource_limits(-1, -1, 1));
    f.write(W1, 1, 1);
    assert!(matches!(f.write(W2, 1, 2), StoreOutcome::Rejected { .. }));
    let iid = f.iid(1);
    let inst = f.rhc.instances.get(&iid).expect("instance");
    assert_eq!(inst.wr_iid, W1);
    assert!(inst.wr_iid_islive);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(values(&got), vec![1]);
}

#[test]
fn test_unregister_wr_with_autodispose() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.write(W1, 2, 2);
    f.rhc.take(10, ReadMask::ANY, Some(f.iid(2)), None);
    assert!(f.rhc.unregister_wr(W1, true));
    // instance 2 was empty: its invalid sample reports the dispose
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(got.len(), 2);
    assert!(got
        .iter()
        .all(|(_, i)| i.instance_state == InstanceState::NotAliveDisposed));
    assert!(!f.rhc.unregister_wr(W1, true), "nothing left to unregister");
}

#[test]
fn test_unregister_wr_without_autodispose() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.rhc.unregister_wr(W1, false);
    let got = f.rhc.read(10, ReadMask::ANY, None, None);
    assert_eq!(got[0].1.instance_state, InstanceState::NotAliveNoWriters);
}

#[test]
fn test_mask_and_condition_narrow_together() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 1);
    f.write(W1, 1, 2);
    f.rhc.read(1, ReadMask::ANY, None, None);
    let cond = Arc::new(ReadCondition::new(
        Entity(Handle::from_raw(7)),
        ReadMask::NOT_READ,
        None,
    ));
    f.rhc.add_condition(Arc::clone(&cond));
    assert!(cond.get_trigger_value());

    let got = f.rhc.read(10, ReadMask::ANY, None, Some(&cond));
    assert_eq!(values(&got), vec![2]);
    assert!(!cond.get_trigger_value(), "everything has been read");

    f.rhc.remove_condition(&cond);
    f.write(W1, 1, 3);
    assert!(!cond.get_trigger_value(), "detached conditions are not updated");
}

#[test]
fn test_query_condition_filters_samples() {
    let mut f = Fixture::new(Qos::new().keep_all());
    f.write(W1, 1, 5);
    let bit = f.rhc.alloc_query_bit().expect("bit");
    let filter: SampleFilter = Arc::new(|s: &dyn std::any::Any| {
        s.downcast_ref::<Point>().is_some_and(|p| p.x > 10)
    });
    let cond = Arc::new(ReadCondition::new(
        Entity(Handle::from_raw(8)),
        ReadMask::ANY,
        Some(QueryFilter { bit, filter }),
    ));
    f.rhc.add_condition(Arc::clone(&cond));
    assert!(!cond.get_trigger_value());

    f.write(W1, 2, 20);
    assert!(cond.get_trigger_value());
    f.write(W1, 3, 30);

    let got = f.rhc.take(10, ReadMask::ANY, None, Some(&cond));
    assert_eq!(values(&got), vec![20, 30]);
    assert!(!cond.get_trigger_value());
    assert_eq!(f.rhc.sample_count(), 1);

    f.rhc.remove_condition(&cond);
    assert_eq!(f.rhc.alloc_query_bit(), Some(bit), "bit is reusable");
}

#[test]
fn test_query_bits_run_out_after_64() {
    let mut f = Fixture::new(Qos::new());
    let bits: Vec<u64> = (0..64)
        .map(|_| f.rhc.alloc_query_bit().expect("bit"))
        .collect();
    assert_eq!(bits[0], 1);
    assert_eq!(bits[63], 1 << 63);
    assert_eq!(f.rhc.alloc_query_bit(), None);
    f.rhc.free_query_bit(bits[5]);
    assert_eq!(f.rhc.alloc_query_bit(), Some(bits[5]));
}

#[test]
fn test_instance_refs_are_released_on_drop() {
    let mut f = Fixture::new(Qos::new());
    f.write(W1, 1, 1);
    f.write(W1, 2, 1);
    assert_eq!(f.tkmap.len(), 2);
    let Fixture { rhc, tkmap, .. } = f;
    drop(rhc);
    assert!(tkmap.is_empty());
}
