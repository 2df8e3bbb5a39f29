// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/take integration tests
//!
//! Exercises the reader history cache through the public API: sample and
//! instance states, ranks, conditions sharing a reader, and error codes.
//! Every test uses its own topic name since writers deliver to all readers
//! of a domain.

use cdds::core::ser::{CdrWriter, Cursor, SerResult};
use cdds::core::serdata::TopicType;
use cdds::dds::{
    self, Entity, InstanceState, Qos, ReadMask, SampleInfo, SampleState, ViewState, HANDLE_NIL,
};
use cdds::ReturnCode;

#[derive(Debug, Default, Clone, PartialEq)]
struct KeyValue {
    key: String,
    value: String,
}

impl KeyValue {
    fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl TopicType for KeyValue {
    fn type_name() -> &'static str {
        "Space::KeyValue"
    }
    fn has_key() -> bool {
        true
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_string(&self.key)?;
        w.write_string(&self.value)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self {
            key: r.read_string()?,
            value: r.read_string()?,
        })
    }
    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_string(&self.key)
    }
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        self.key = r.read_string()?;
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Pair {
    participant: Entity,
    writer: Entity,
    reader: Entity,
}

impl Pair {
    fn new(topic: &str, reader_qos: Option<&Qos>, writer_qos: Option<&Qos>) -> Self {
        let participant = dds::create_participant(0, None, None).expect("participant");
        let tp = dds::create_topic::<KeyValue>(participant, topic, None, None).expect("topic");
        let reader = dds::create_reader(participant, tp, reader_qos, None).expect("reader");
        let writer = dds::create_writer(participant, tp, writer_qos, None).expect("writer");
        Self {
            participant,
            writer,
            reader,
        }
    }

    fn keep_all(topic: &str) -> Self {
        Self::new(topic, Some(&Qos::new().keep_all()), None)
    }

    fn write(&self, key: &str, value: &str) {
        dds::write(self.writer, &KeyValue::new(key, value)).expect("write");
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        let _ = dds::delete(self.participant);
    }
}

fn read_all(entity: Entity) -> Vec<(KeyValue, SampleInfo)> {
    let mut samples = vec![KeyValue::default(); 16];
    let mut infos = vec![SampleInfo::default(); 16];
    let n = dds::read(entity, &mut samples, &mut infos, 16).expect("read");
    samples.into_iter().zip(infos).take(n).collect()
}

fn take_all(entity: Entity) -> Vec<(KeyValue, SampleInfo)> {
    let mut samples = vec![KeyValue::default(); 16];
    let mut infos = vec![SampleInfo::default(); 16];
    let n = dds::take(entity, &mut samples, &mut infos, 16).expect("take");
    samples.into_iter().zip(infos).take(n).collect()
}

// ============================================================================
// Read / take state machine
// ============================================================================

#[test]
fn test_key_value_roundtrip() {
    let p = Pair::new("read_take/roundtrip", None, None);
    p.write("aap", "banaan");

    let got = take_all(p.reader);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, KeyValue::new("aap", "banaan"));
    assert!(got[0].1.valid_data);
    assert_eq!(got[0].1.instance_state, InstanceState::Alive);
    assert_eq!(got[0].1.view_state, ViewState::New);
    assert_ne!(got[0].1.instance_handle, HANDLE_NIL);
    assert_eq!(
        got[0].1.publication_handle,
        dds::get_instance_handle(p.writer).expect("writer iid")
    );
}

#[test]
fn test_read_is_idempotent() {
    let p = Pair::keep_all("read_take/idempotent");
    p.write("a", "1");
    p.write("b", "2");
    p.write("a", "3");

    let first = read_all(p.reader);
    assert_eq!(first.len(), 3);
    assert!(first
        .iter()
        .all(|(_, i)| i.sample_state == SampleState::NotRead));

    for _ in 0..3 {
        let again = read_all(p.reader);
        assert_eq!(again.len(), first.len());
        for ((s0, i0), (s1, i1)) in first.iter().zip(&again) {
            assert_eq!(s0, s1);
            assert_eq!(i0.instance_handle, i1.instance_handle);
            assert_eq!(i1.sample_state, SampleState::Read);
        }
    }
}

#[test]
fn test_take_is_exclusive() {
    let p = Pair::keep_all("read_take/exclusive");
    let all = dds::create_readcondition(p.reader, ReadMask::ANY).expect("condition");
    let unread = dds::create_readcondition(p.reader, ReadMask::NOT_READ).expect("condition");
    p.write("a", "1");
    p.write("b", "2");

    // Taking through one condition removes the sample for its siblings too.
    let mut samples = vec![KeyValue::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    assert_eq!(
        dds::take(all, &mut samples, &mut infos, 1).expect("take one"),
        1
    );
    let taken = samples[0].clone();

    for entity in [unread, all, p.reader] {
        let rest = read_all(entity);
        assert_eq!(rest.len(), 1, "entity {} still sees one sample", entity);
        assert_ne!(rest[0].0, taken);
    }
    assert_eq!(take_all(p.reader).len(), 1);
    assert!(take_all(p.reader).is_empty());
    assert!(read_all(unread).is_empty());
}

#[test]
fn test_condition_mask_only_narrows() {
    let p = Pair::keep_all("read_take/narrow");
    let unread = dds::create_readcondition(p.reader, ReadMask::NOT_READ).expect("condition");
    p.write("a", "1");
    read_all(p.reader);
    p.write("a", "2");

    // The caller's READ mask combined with the condition's NOT_READ selects nothing.
    let mut samples = vec![KeyValue::default(); 4];
    let mut infos = vec![SampleInfo::default(); 4];
    let n = dds::read_mask(unread, &mut samples, &mut infos, 4, ReadMask::READ).expect("read");
    assert_eq!(n, 0);

    let n = dds::read_mask(unread, &mut samples, &mut infos, 4, ReadMask::ANY).expect("read");
    assert_eq!(n, 1);
    assert_eq!(samples[0].value, "2");
}

#[test]
fn test_query_condition_filters_content() {
    let p = Pair::keep_all("read_take/query");
    let q = dds::create_querycondition::<KeyValue, _>(p.reader, ReadMask::ANY, |s| {
        s.value.starts_with('x')
    })
    .expect("query");
    p.write("a", "x1");
    p.write("b", "y1");
    p.write("c", "x2");

    let got = take_all(q);
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|(s, _)| s.value.starts_with('x')));
    assert_eq!(read_all(p.reader).len(), 1);
}

#[test]
fn test_sample_rank_decreases_with_arrival() {
    let p = Pair::keep_all("read_take/rank");
    for v in ["1", "2", "3"] {
        p.write("k", v);
    }
    p.write("other", "x");

    let got = read_all(p.reader);
    let ranks: Vec<u32> = got
        .iter()
        .filter(|(s, _)| s.key == "k")
        .map(|(_, i)| i.sample_rank)
        .collect();
    assert_eq!(ranks, vec![2, 1, 0]);
    let other = got.iter().find(|(s, _)| s.key == "other").expect("other");
    assert_eq!(other.1.sample_rank, 0);

    // Ranks are relative to the returned snapshot.
    let mut samples = vec![KeyValue::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    dds::read(p.reader, &mut samples, &mut infos, 1).expect("read one");
    assert_eq!(infos[0].sample_rank, 0);
}

#[test]
fn test_unregister_last_writer_synthesizes_invalid_sample() {
    let p = Pair::new(
        "read_take/no_writers",
        Some(&Qos::new().keep_all()),
        Some(&Qos::new().autodispose(false)),
    );
    p.write("aap", "banaan");
    // An unread sample already reports the new state; read it first so the
    // transition needs an entry of its own.
    assert_eq!(read_all(p.reader).len(), 1);
    dds::unregister_instance(p.writer, &KeyValue::new("aap", "")).expect("unregister");

    let got = take_all(p.reader);
    assert_eq!(got.len(), 2);
    let (sample, info) = got.last().expect("state change");
    assert!(!info.valid_data);
    assert_eq!(info.instance_state, InstanceState::NotAliveNoWriters);
    assert_eq!(sample.key, "aap");
    assert_eq!(sample.value, "");
    assert!(got
        .iter()
        .all(|(_, i)| i.instance_state == InstanceState::NotAliveNoWriters));
}

#[test]
fn test_dispose_generation_ranks() {
    let p = Pair::keep_all("read_take/generations");
    p.write("k", "1");
    dds::dispose(p.writer, &KeyValue::new("k", "")).expect("dispose");
    p.write("k", "2");

    let got: Vec<SampleInfo> = read_all(p.reader)
        .into_iter()
        .filter(|(_, i)| i.valid_data)
        .map(|(_, i)| i)
        .collect();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].disposed_generation_count, 0);
    assert_eq!(got[1].disposed_generation_count, 1);
    assert_eq!(got[0].generation_rank, 1);
    assert_eq!(got[1].generation_rank, 0);
    assert_eq!(got[0].absolute_generation_rank, 1);
    assert_eq!(got[1].instance_state, InstanceState::Alive);
}

#[test]
fn test_instance_variants() {
    let p = Pair::keep_all("read_take/instance");
    p.write("a", "1");
    p.write("b", "2");
    p.write("a", "3");

    let ih = dds::lookup_instance(p.reader, &KeyValue::new("a", "")).expect("lookup");
    assert_ne!(ih, HANDLE_NIL);

    let mut samples = vec![KeyValue::default(); 4];
    let mut infos = vec![SampleInfo::default(); 4];
    let n = dds::take_instance(p.reader, &mut samples, &mut infos, 4, ih).expect("take");
    assert_eq!(n, 2);
    assert!(samples[..n].iter().all(|s| s.key == "a"));
    assert!(infos[..n].iter().all(|i| i.instance_handle == ih));

    let mut key = KeyValue::new("junk", "junk");
    dds::instance_get_key(p.writer, ih, &mut key).expect("key");
    assert_eq!(key, KeyValue::new("a", ""));

    assert_eq!(read_all(p.reader).len(), 1);
}

// ============================================================================
// Error codes
// ============================================================================

#[test]
fn test_unknown_instance_is_precondition() {
    let p = Pair::new("read_take/unknown_instance", None, None);
    p.write("a", "1");

    let mut samples = vec![KeyValue::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    for ih in [HANDLE_NIL, 0xdead_beef] {
        let err = dds::read_instance(p.reader, &mut samples, &mut infos, 1, ih)
            .expect_err("unknown instance");
        assert_eq!(err.return_code(), ReturnCode::PreconditionNotMet);
    }
}

#[test]
fn test_read_on_writer_is_illegal() {
    let p = Pair::new("read_take/illegal", None, None);
    let mut samples = vec![KeyValue::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    for entity in [p.writer, p.participant] {
        let err = dds::read(entity, &mut samples, &mut infos, 1).expect_err("not a reader");
        assert_eq!(err.return_code(), ReturnCode::IllegalOperation);
    }
}

#[test]
fn test_buffer_mismatch_is_bad_parameter() {
    let p = Pair::new("read_take/buffers", None, None);
    let mut samples = vec![KeyValue::default(); 2];
    let mut infos = vec![SampleInfo::default(); 1];

    let err = dds::read(p.reader, &mut samples, &mut infos, 2).expect_err("short infos");
    assert_eq!(err.return_code(), ReturnCode::BadParameter);
    let err = dds::take(p.reader, &mut samples, &mut infos, 0).expect_err("maxs 0");
    assert_eq!(err.return_code(), ReturnCode::BadParameter);
}

#[test]
fn test_deleted_reader_is_already_deleted() {
    let p = Pair::new("read_take/deleted", None, None);
    dds::delete(p.reader).expect("delete reader");

    let mut samples = vec![KeyValue::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    let err = dds::take(p.reader, &mut samples, &mut infos, 1).expect_err("deleted");
    assert_eq!(err.return_code(), ReturnCode::AlreadyDeleted);
}

// ============================================================================
// Serdata results
// ============================================================================

#[test]
fn test_takecdr_hands_out_serdata() {
    let p = Pair::keep_all("read_take/cdr");
    p.write("aap", "banaan");

    let got = dds::takecdr(p.reader, 8, ReadMask::ANY).expect("takecdr");
    assert_eq!(got.len(), 1);
    let (data, info) = &got[0];
    assert!(info.valid_data);
    let mut sample = KeyValue::default();
    data.to_sample(&mut sample).expect("to_sample");
    assert_eq!(sample, KeyValue::new("aap", "banaan"));

    // Disposing an instance with no samples left yields a key-only entry.
    dds::dispose(p.writer, &KeyValue::new("aap", "")).expect("dispose");
    let got = dds::takecdr(p.reader, 8, ReadMask::ANY).expect("takecdr");
    assert_eq!(got.len(), 1);
    let (key, info) = &got[0];
    assert!(!info.valid_data);
    assert_eq!(info.instance_state, InstanceState::NotAliveDisposed);
    assert!(key.eqkey(&**data));

    // The caller owns the references; the cache no longer has them.
    assert!(dds::readcdr(p.reader, 8, ReadMask::ANY)
        .expect("readcdr")
        .is_empty());
}
