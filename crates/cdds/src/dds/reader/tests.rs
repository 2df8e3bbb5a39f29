// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::read::*;
use crate::core::ser::{CdrWriter, Cursor, SerResult};
use crate::core::serdata::TopicType;
use crate::dds::{
    self, Entity, Error, InstanceState, Qos, ReadMask, SampleInfo, SampleState, StatusMask,
    ViewState, HANDLE_NIL,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Reading {
    sensor: u32,
    value: i64,
}

impl TopicType for Reading {
    fn type_name() -> &'static str {
        "Test::Reading"
    }
    fn has_key() -> bool {
        true
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.sensor)?;
        w.write_i64(self.value)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self {
            sensor: r.read_u32()?,
            value: r.read_i64()?,
        })
    }
    fn encode_key(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.sensor)
    }
    fn decode_key(&mut self, r: &mut Cursor<'_>) -> SerResult<()> {
        self.sensor = r.read_u32()?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Other {
    n: u32,
}

impl TopicType for Other {
    fn type_name() -> &'static str {
        "Test::Other"
    }
    fn encode(&self, w: &mut CdrWriter) -> SerResult<()> {
        w.write_u32(self.n)
    }
    fn decode(r: &mut Cursor<'_>) -> SerResult<Self> {
        Ok(Self { n: r.read_u32()? })
    }
}

struct Setup {
    participant: Entity,
    writer: Entity,
    reader: Entity,
}

impl Setup {
    fn new(topic: &str, reader_qos: Option<&Qos>) -> Self {
        let participant = dds::create_participant(0, None, None).expect("participant");
        let tp = dds::create_topic::<Reading>(participant, topic, None, None).expect("topic");
        let reader = dds::create_reader(participant, tp, reader_qos, None).expect("reader");
        let writer = dds::create_writer(participant, tp, None, None).expect("writer");
        Self {
            participant,
            writer,
            reader,
        }
    }

    fn write(&self, sensor: u32, value: i64) {
        dds::write(self.writer, &Reading { sensor, value }).expect("write");
    }
}

impl Drop for Setup {
    fn drop(&mut self) {
        let _ = dds::delete(self.participant);
    }
}

fn buffers(n: usize) -> (Vec<Reading>, Vec<SampleInfo>) {
    (vec![Reading::default(); n], vec![SampleInfo::default(); n])
}

#[test]
fn test_read_marks_samples_read() {
    let s = Setup::new("reader_tests/read_marks", None);
    s.write(1, 10);

    let (mut samples, mut infos) = buffers(4);
    let n = read(s.reader, &mut samples, &mut infos, 4).expect("read");
    assert_eq!(n, 1);
    assert_eq!(samples[0], Reading { sensor: 1, value: 10 });
    assert_eq!(infos[0].sample_state, SampleState::NotRead);
    assert_eq!(infos[0].view_state, ViewState::New);
    assert_eq!(infos[0].instance_state, InstanceState::Alive);
    assert!(infos[0].valid_data);

    let n = read(s.reader, &mut samples, &mut infos, 4).expect("read again");
    assert_eq!(n, 1);
    assert_eq!(infos[0].sample_state, SampleState::Read);
}

#[test]
fn test_take_removes_samples() {
    let s = Setup::new("reader_tests/take_removes", Some(&Qos::new().keep_all()));
    s.write(1, 1);
    s.write(1, 2);
    s.write(2, 3);

    let (mut samples, mut infos) = buffers(8);
    assert_eq!(take(s.reader, &mut samples, &mut infos, 8).expect("take"), 3);
    assert_eq!(take(s.reader, &mut samples, &mut infos, 8).expect("take empty"), 0);
    assert_eq!(read(s.reader, &mut samples, &mut infos, 8).expect("read empty"), 0);
}

#[test]
fn test_maxs_limits_result() {
    let s = Setup::new("reader_tests/maxs", Some(&Qos::new().keep_all()));
    for v in 0..5 {
        s.write(7, v);
    }
    let (mut samples, mut infos) = buffers(2);
    assert_eq!(take(s.reader, &mut samples, &mut infos, 2).expect("take 2"), 2);
    assert_eq!(samples[0].value, 0);
    assert_eq!(samples[1].value, 1);
}

#[test]
fn test_bad_buffer_arguments() {
    let s = Setup::new("reader_tests/bad_buffers", None);
    let (mut samples, mut infos) = buffers(2);

    let err = read(s.reader, &mut samples, &mut infos, 0).expect_err("maxs 0");
    assert!(matches!(err, Error::BadParameter(_)));
    let err = read(s.reader, &mut samples, &mut infos, 3).expect_err("buffer too small");
    assert!(matches!(err, Error::BadParameter(_)));
    let err = read(s.reader, &mut samples[..0], &mut infos, 1).expect_err("empty buffer");
    assert!(matches!(err, Error::BadParameter(_)));
}

#[test]
fn test_read_on_non_reader_is_illegal() {
    let s = Setup::new("reader_tests/illegal", None);
    let (mut samples, mut infos) = buffers(1);
    let err = read(s.writer, &mut samples, &mut infos, 1).expect_err("writer");
    assert!(matches!(err, Error::IllegalOperation));
    let err = take(s.participant, &mut samples, &mut infos, 1).expect_err("participant");
    assert!(matches!(err, Error::IllegalOperation));
}

#[test]
fn test_foreign_sample_type_is_rejected() {
    let s = Setup::new("reader_tests/foreign_type", None);
    s.write(1, 1);
    let mut samples = vec![Other::default(); 1];
    let mut infos = vec![SampleInfo::default(); 1];
    let err = read(s.reader, &mut samples, &mut infos, 1).expect_err("foreign type");
    assert!(matches!(err, Error::BadParameter(_)));
}

#[test]
fn test_read_next_returns_unread_only() {
    let s = Setup::new("reader_tests/read_next", Some(&Qos::new().keep_all()));
    s.write(1, 1);
    s.write(2, 2);

    let (mut samples, mut infos) = buffers(1);
    assert_eq!(read_next(s.reader, &mut samples, &mut infos).expect("first"), 1);
    let first = samples[0].clone();
    assert_eq!(read_next(s.reader, &mut samples, &mut infos).expect("second"), 1);
    assert_ne!(samples[0], first);
    assert_eq!(read_next(s.reader, &mut samples, &mut infos).expect("none left"), 0);
}

#[test]
fn test_next_variants_accept_readers_only() {
    let s = Setup::new("reader_tests/next_reader_only", None);
    let cond = dds::create_readcondition(s.reader, ReadMask::ANY).expect("condition");
    let (mut samples, mut infos) = buffers(1);
    let err = take_next(cond, &mut samples, &mut infos).expect_err("condition");
    assert!(matches!(err, Error::IllegalOperation));
}

#[test]
fn test_instance_variants() {
    let s = Setup::new("reader_tests/instances", Some(&Qos::new().keep_all()));
    s.write(1, 10);
    s.write(2, 20);
    s.write(1, 11);

    let ih = dds::lookup_instance(s.reader, &Reading { sensor: 1, value: 0 }).expect("lookup");
    assert_ne!(ih, HANDLE_NIL);

    let (mut samples, mut infos) = buffers(4);
    let n = take_instance(s.reader, &mut samples, &mut infos, 4, ih).expect("take instance");
    assert_eq!(n, 2);
    assert!(samples[..n].iter().all(|r| r.sensor == 1));
    assert!(infos[..n].iter().all(|i| i.instance_handle == ih));

    let err = read_instance(s.reader, &mut samples, &mut infos, 4, HANDLE_NIL).expect_err("nil");
    assert!(matches!(err, Error::PreconditionNotMet(_)));
}

#[test]
fn test_unknown_instance_is_precondition() {
    let s = Setup::new("reader_tests/unknown_instance", None);
    let (mut samples, mut infos) = buffers(1);
    let err = read_instance(s.reader, &mut samples, &mut infos, 1, 0xdead_beef)
        .expect_err("unknown instance");
    assert!(matches!(err, Error::PreconditionNotMet(_)));
}

#[test]
fn test_mask_selects_states() {
    let s = Setup::new("reader_tests/mask", Some(&Qos::new().keep_all()));
    s.write(1, 1);
    let (mut samples, mut infos) = buffers(4);
    read(s.reader, &mut samples, &mut infos, 4).expect("read");
    s.write(1, 2);

    let n = read_mask(s.reader, &mut samples, &mut infos, 4, ReadMask::NOT_READ).expect("not read");
    assert_eq!(n, 1);
    assert_eq!(samples[0].value, 2);
    let n = take_mask(s.reader, &mut samples, &mut infos, 4, ReadMask::READ).expect("read ones");
    assert_eq!(n, 2, "the second sample was read by read_mask");

    let err = read_mask(s.reader, &mut samples, &mut infos, 4, ReadMask::from_bits(0x100))
        .expect_err("undefined bits");
    assert!(matches!(err, Error::BadParameter(_)));
}

#[test]
fn test_read_through_condition() {
    let s = Setup::new("reader_tests/via_condition", Some(&Qos::new().keep_all()));
    let cond = dds::create_readcondition(s.reader, ReadMask::NOT_READ).expect("condition");
    s.write(1, 1);

    let (mut samples, mut infos) = buffers(4);
    assert_eq!(read(cond, &mut samples, &mut infos, 4).expect("cond read"), 1);
    assert_eq!(read(cond, &mut samples, &mut infos, 4).expect("nothing unread"), 0);
    assert_eq!(read(s.reader, &mut samples, &mut infos, 4).expect("reader sees it"), 1);
}

#[test]
fn test_dispose_yields_invalid_sample_with_key() {
    let s = Setup::new("reader_tests/dispose", None);
    dds::dispose(s.writer, &Reading { sensor: 9, value: 0 }).expect("dispose");

    let (mut samples, mut infos) = buffers(1);
    samples[0].value = 1234;
    assert_eq!(take(s.reader, &mut samples, &mut infos, 1).expect("take"), 1);
    assert!(!infos[0].valid_data);
    assert_eq!(infos[0].instance_state, InstanceState::NotAliveDisposed);
    assert_eq!(samples[0], Reading { sensor: 9, value: 0 });
}

#[test]
fn test_read_resets_data_available() {
    let s = Setup::new("reader_tests/data_available", None);
    s.write(1, 1);
    assert!(dds::get_status_changes(s.reader)
        .expect("status")
        .contains(StatusMask::DATA_AVAILABLE));

    let (mut samples, mut infos) = buffers(1);
    read(s.reader, &mut samples, &mut infos, 1).expect("read");
    assert!(!dds::get_status_changes(s.reader)
        .expect("status")
        .contains(StatusMask::DATA_AVAILABLE));
}

#[test]
fn test_cdr_variants_return_serdata() {
    let s = Setup::new("reader_tests/cdr", Some(&Qos::new().keep_all()));
    s.write(3, 30);
    s.write(4, 40);

    let got = readcdr(s.reader, 8, ReadMask::ANY).expect("readcdr");
    assert_eq!(got.len(), 2);
    let taken = takecdr(s.reader, 1, ReadMask::ANY).expect("takecdr");
    assert_eq!(taken.len(), 1);
    let mut sample = Reading::default();
    taken[0].0.to_sample(&mut sample).expect("to_sample");
    assert_eq!(sample, Reading { sensor: 3, value: 30 });

    let err = takecdr(s.reader, 0, ReadMask::ANY).expect_err("maxs 0");
    assert!(matches!(err, Error::BadParameter(_)));
}

// ============================================================================
// Loans
// ============================================================================

#[test]
fn test_loan_roundtrip() {
    let s = Setup::new("reader_tests/loan_roundtrip", None);
    s.write(1, 5);

    let mut loan = None;
    assert_eq!(read_wl::<Reading>(s.reader, &mut loan, 4).expect("read_wl"), 1);
    {
        let l = loan.as_ref().expect("loan present");
        assert_eq!(l.len(), 1);
        assert_eq!(l.samples()[0].value, 5);
        assert_eq!(l.reader(), s.reader);
    }
    return_loan(s.reader, &mut loan).expect("return");
    assert!(loan.is_none());
}

#[test]
fn test_loan_slot_must_be_empty() {
    let s = Setup::new("reader_tests/loan_slot", None);
    s.write(1, 5);
    let mut loan = None;
    read_wl::<Reading>(s.reader, &mut loan, 1).expect("read_wl");
    let err = read_wl::<Reading>(s.reader, &mut loan, 1).expect_err("slot in use");
    assert!(matches!(err, Error::BadParameter(_)));
    return_loan(s.reader, &mut loan).expect("return");
}

#[test]
fn test_second_loan_while_first_outstanding() {
    let s = Setup::new("reader_tests/loan_twice", None);
    s.write(1, 5);

    let mut first = None;
    let mut second = None;
    read_wl::<Reading>(s.reader, &mut first, 1).expect("first loan");
    read_wl::<Reading>(s.reader, &mut second, 1).expect("second loan");
    assert!(first.is_some() && second.is_some());

    // the second is a fresh buffer: returning it just frees it
    return_loan(s.reader, &mut second).expect("return fresh");
    return_loan(s.reader, &mut first).expect("return cached");
}

#[test]
fn test_cached_buffer_is_reused_after_return() {
    let s = Setup::new("reader_tests/loan_reuse", Some(&Qos::new().keep_all()));
    s.write(1, 5);
    s.write(1, 6);

    let mut loan = None;
    read_wl::<Reading>(s.reader, &mut loan, 1).expect("first read_wl");
    return_loan(s.reader, &mut loan).expect("first return");

    let n = take_wl::<Reading>(s.reader, &mut loan, 4).expect("second loan");
    assert_eq!(n, 2);
    let values: Vec<i64> = loan.as_ref().expect("loan").iter().map(|(r, _)| r.value).collect();
    assert_eq!(values, vec![5, 6]);
    return_loan(s.reader, &mut loan).expect("second return");
    assert!(loan.is_none());
}

#[test]
fn test_empty_read_restores_loan_state() {
    let s = Setup::new("reader_tests/loan_empty", None);
    let mut loan = None;
    assert_eq!(take_wl::<Reading>(s.reader, &mut loan, 4).expect("empty"), 0);
    assert!(loan.is_none());

    s.write(1, 1);
    assert_eq!(take_wl::<Reading>(s.reader, &mut loan, 4).expect("data"), 1);
    return_loan(s.reader, &mut loan).expect("return");
}

#[test]
fn test_return_loan_validates_entity() {
    let s = Setup::new("reader_tests/loan_entity", None);
    let mut none: Option<ReaderLoan<Reading>> = None;
    return_loan(s.reader, &mut none).expect("nothing to return");
    let err = return_loan(s.writer, &mut none).expect_err("writer");
    assert!(matches!(err, Error::IllegalOperation));
}

#[test]
fn test_loan_returned_to_other_reader_is_refused() {
    let s = Setup::new("reader_tests/loan_other_reader", None);
    let tp = dds::get_topic(s.reader).expect("topic");
    let other = dds::create_reader(s.participant, tp, None, None).expect("other reader");
    s.write(1, 1);

    let mut loan = None;
    read_wl::<Reading>(s.reader, &mut loan, 1).expect("read_wl");
    let err = return_loan(other, &mut loan).expect_err("wrong reader");
    assert!(matches!(err, Error::PreconditionNotMet(_)));
    assert!(loan.is_some(), "refused loan stays with the caller");
    return_loan(s.reader, &mut loan).expect("right reader");
}

// ============================================================================
// Status
// ============================================================================

#[test]
fn test_subscription_matched_counts_writers() {
    let s = Setup::new("reader_tests/matched", None);
    let st = dds::get_subscription_matched_status(s.reader).expect("status");
    assert_eq!(st.current_count, 1);
    assert_eq!(st.total_count, 1);

    dds::delete(s.writer).expect("delete writer");
    let st = dds::get_subscription_matched_status(s.reader).expect("status");
    assert_eq!(st.current_count, 0);
    assert_eq!(st.current_count_change, -1);
}

#[test]
fn test_sample_rejected_on_resource_limit() {
    let qos = Qos::new().keep_all().resource_limits(1, -1, -1);
    let s = Setup::new("reader_tests/rejected", Some(&qos.best_effort()));
    s.write(1, 1);
    s.write(2, 2);

    let st = dds::get_sample_rejected_status(s.reader).expect("status");
    assert_eq!(st.total_count, 1);
    assert_eq!(st.total_count_change, 1);
    let st = dds::get_sample_rejected_status(s.reader).expect("status again");
    assert_eq!(st.total_count_change, 0);
}
