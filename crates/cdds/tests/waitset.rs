// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Waitset integration tests
//!
//! Blocking waits on readers, read conditions, guard conditions and the
//! waitset's own trigger, including wake-ups from other threads.

use cdds::core::ser::{CdrWriter, Cursor, SerResult};
use cdds::core::serdata::TopicType;
use cdds::dds::{self, AttachArg, Entity, ReadMask, SampleInfo, StatusMask};
use cdds::ReturnCode;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, PartialEq)]
struct Tick {
    n: u64,
}

impl TopicType for Tick {
    fn type_name() -> &'static str {
        "Space::Tick"
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u64(self.n)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self { n: r.read_u64()? })
    }
}

struct Scene {
    participant: Entity,
    writer: Entity,
    reader: Entity,
    waitset: Entity,
}

impl Scene {
    fn new(topic: &str) -> Self {
        let participant = dds::create_participant(0, None, None).expect("participant");
        let tp = dds::create_topic::<Tick>(participant, topic, None, None).expect("topic");
        let reader = dds::create_reader(participant, tp, None, None).expect("reader");
        let writer = dds::create_writer(participant, tp, None, None).expect("writer");
        let waitset = dds::create_waitset(participant).expect("waitset");
        Self {
            participant,
            writer,
            reader,
            waitset,
        }
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        let _ = dds::delete(self.participant);
    }
}

const SHORT: Duration = Duration::from_millis(50);

#[test]
fn test_empty_waitset_is_a_timed_sleep() {
    let s = Scene::new("waitset/empty");
    let mut xs = [0 as AttachArg; 4];
    let start = Instant::now();
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, SHORT).expect("wait"), 0);
    assert!(start.elapsed() >= SHORT);

    let deadline = dds::time_now() + SHORT.as_nanos() as i64;
    assert_eq!(
        dds::waitset_wait_until(s.waitset, &mut xs, deadline).expect("wait_until"),
        0
    );
}

#[test]
fn test_reader_triggers_on_data() {
    let s = Scene::new("waitset/reader");
    // Matching the local writer already raised SUBSCRIPTION_MATCHED.
    assert!(dds::read_status(s.reader, StatusMask::SUBSCRIPTION_MATCHED)
        .expect("status")
        .contains(StatusMask::SUBSCRIPTION_MATCHED));
    dds::set_status_mask(s.reader, StatusMask::DATA_AVAILABLE).expect("mask");
    dds::waitset_attach(s.waitset, s.reader, 7).expect("attach");
    let mut xs = [0 as AttachArg; 2];
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, Duration::ZERO).expect("poll"), 0);

    dds::write(s.writer, &Tick { n: 1 }).expect("write");
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, SHORT).expect("wait"), 1);
    assert_eq!(xs[0], 7);

    // Taking the data resets DATA_AVAILABLE.
    let mut samples = vec![Tick::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    dds::take(s.reader, &mut samples, &mut infos, 1).expect("take");
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, Duration::ZERO).expect("poll"), 0);
}

#[test]
fn test_write_from_other_thread_wakes_waiter() {
    let s = Scene::new("waitset/cross_thread");
    let cond = dds::create_readcondition(s.reader, ReadMask::NOT_READ).expect("condition");
    dds::waitset_attach(s.waitset, cond, 99).expect("attach");

    let writer = s.writer;
    let producer = thread::spawn(move || {
        thread::sleep(SHORT);
        dds::write(writer, &Tick { n: 5 }).expect("write");
    });

    let mut xs = [0 as AttachArg; 1];
    let n = dds::waitset_wait(s.waitset, &mut xs, Duration::from_secs(10)).expect("wait");
    producer.join().expect("producer");
    assert_eq!(n, 1);
    assert_eq!(xs[0], 99);
}

#[test]
fn test_guard_condition_and_own_trigger() {
    let s = Scene::new("waitset/guard");
    let gc = dds::create_guardcondition(s.participant).expect("guard");
    dds::waitset_attach(s.waitset, gc, 1).expect("attach guard");
    dds::waitset_attach(s.waitset, s.waitset, 2).expect("attach self");
    assert_eq!(
        dds::waitset_get_entities(s.waitset).expect("entities"),
        vec![gc, s.waitset]
    );

    let mut xs = [0 as AttachArg; 4];
    dds::set_guardcondition(gc, true).expect("set");
    dds::waitset_set_trigger(s.waitset, true).expect("trigger");
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, SHORT).expect("wait"), 2);
    assert_eq!(&xs[..2], &[1, 2]);

    assert!(dds::take_guardcondition(gc).expect("take"));
    dds::waitset_set_trigger(s.waitset, false).expect("untrigger");
    assert_eq!(dds::waitset_wait(s.waitset, &mut xs, Duration::ZERO).expect("poll"), 0);
}

#[test]
fn test_attach_rules() {
    let s = Scene::new("waitset/attach_rules");
    dds::waitset_attach(s.waitset, s.reader, 0).expect("attach");
    let err = dds::waitset_attach(s.waitset, s.reader, 0).expect_err("twice");
    assert_eq!(err.return_code(), ReturnCode::PreconditionNotMet);

    let other = dds::create_participant(0, None, None).expect("participant");
    let err = dds::waitset_attach(s.waitset, other, 0).expect_err("foreign participant");
    assert_eq!(err.return_code(), ReturnCode::BadParameter);
    dds::delete(other).expect("delete");

    dds::waitset_detach(s.waitset, s.reader).expect("detach");
    let err = dds::waitset_detach(s.waitset, s.reader).expect_err("not attached");
    assert_eq!(err.return_code(), ReturnCode::PreconditionNotMet);
}

#[test]
fn test_deleted_entity_is_detached() {
    let s = Scene::new("waitset/deleted_entity");
    let gc = dds::create_guardcondition(s.participant).expect("guard");
    dds::waitset_attach(s.waitset, gc, 3).expect("attach");
    dds::delete(gc).expect("delete guard");
    assert!(dds::waitset_get_entities(s.waitset)
        .expect("entities")
        .is_empty());
}

#[test]
fn test_deleting_waitset_unblocks_waiter_with_error() {
    let s = Scene::new("waitset/delete_unblocks");
    let ws = s.waitset;
    let waiter = thread::spawn(move || {
        let mut xs = [0 as AttachArg; 1];
        dds::waitset_wait(ws, &mut xs, Duration::from_secs(30))
    });

    thread::sleep(SHORT);
    let start = Instant::now();
    dds::delete(ws).expect("delete waitset");
    let res = waiter.join().expect("waiter");
    assert!(start.elapsed() < Duration::from_secs(10));
    let err = res.expect_err("waiter fails");
    assert_eq!(err.return_code(), ReturnCode::AlreadyDeleted);
}
