// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle table integration tests
//!
//! Claim/release balance, kind isolation and delete semantics, both on a
//! bare table and through entity handles.

use cdds::core::handles::{Handle, HandleError, HandleKind, HandleTable};
use cdds::dds::{self, Entity, EntityKind};
use cdds::ReturnCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn kind(tag: u8) -> HandleKind {
    HandleKind::new(tag).expect("valid kind tag")
}

// ============================================================================
// Bare table
// ============================================================================

#[test]
fn test_handles_are_positive_and_carry_kind() {
    let table = HandleTable::new(64);
    for tag in [1u8, 2, 17, 0x7f] {
        let h = table.create(kind(tag), tag).expect("create");
        assert!(h.raw() > 0, "handle {} must be positive", h);
        assert_eq!(h.kind(), Some(kind(tag)));
    }
    assert_eq!(table.len(), 4);
}

#[test]
fn test_kind_isolation() {
    let table = HandleTable::new(64);
    let kinds: Vec<HandleKind> = (1..=8).map(kind).collect();
    let handles: Vec<Handle> = kinds
        .iter()
        .map(|k| table.create(*k, k.tag()).expect("create"))
        .collect();

    for (h, created) in handles.iter().zip(&kinds) {
        for other in &kinds {
            let res = table.claim(*h, Some(*other));
            if other == created {
                assert_eq!(*res.expect("same kind"), created.tag());
                table.release(*h);
            } else {
                assert_eq!(res.err(), Some(HandleError::UnequalKind));
                assert_eq!(table.status(*h, Some(*other)), Err(HandleError::UnequalKind));
            }
        }
    }
}

#[test]
fn test_claim_after_delete_is_deleted() {
    let table = HandleTable::new(4);
    let h = table.create(kind(3), "gone").expect("create");
    table.delete(h, Duration::ZERO).expect("delete");

    assert_eq!(table.claim(h, None).err(), Some(HandleError::Deleted));
    assert_eq!(table.claim(h, Some(kind(3))).err(), Some(HandleError::Deleted));
    assert_eq!(table.status(h, None), Err(HandleError::Deleted));

    // Reusing the slot must not resurrect the old value.
    let fresh = table.create(kind(3), "fresh").expect("create");
    assert_ne!(fresh, h);
    assert_eq!(table.claim(h, None).err(), Some(HandleError::Deleted));
    assert_eq!(*table.claim(fresh, None).expect("claim fresh"), "fresh");
    table.release(fresh);
}

#[test]
fn test_close_blocks_new_claims_only() {
    let table = HandleTable::new(4);
    let h = table.create(kind(1), 7u32).expect("create");
    let held = table.claim(h, None).expect("claim");

    table.close(h).expect("close");
    table.close(h).expect("close is idempotent");
    assert_eq!(table.claim(h, None).err(), Some(HandleError::Closed));
    assert_eq!(*held, 7);

    table.release(h);
    table.delete(h, Duration::ZERO).expect("delete");
}

#[test]
fn test_delete_times_out_while_claimed() {
    let table = HandleTable::new(4);
    let h = table.create(kind(1), ()).expect("create");
    table.claim(h, None).expect("claim");

    let start = Instant::now();
    assert_eq!(
        table.delete(h, Duration::from_millis(50)).err(),
        Some(HandleError::Timeout)
    );
    assert!(start.elapsed() >= Duration::from_millis(50));

    // Still allocated but closed: the caller retries after releasing.
    assert_eq!(table.claim(h, None).err(), Some(HandleError::Closed));
    table.release(h);
    table.delete(h, Duration::ZERO).expect("retry delete");
    assert!(table.is_empty());
}

#[test]
fn test_delete_wakes_on_last_release() {
    let table = Arc::new(HandleTable::new(4));
    let h = table.create(kind(5), "busy").expect("create");
    table.claim(h, None).expect("first claim");
    table.claim(h, None).expect("second claim");

    let done = Arc::new(AtomicBool::new(false));
    let deleter = {
        let table = Arc::clone(&table);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let res = table.delete(h, Duration::from_secs(10));
            done.store(true, Ordering::SeqCst);
            res
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "delete returned with two claims");

    table.release(h);
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "delete returned with one claim");

    table.release(h);
    let value = deleter.join().expect("deleter thread").expect("delete");
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(*value, "busy");
    assert_eq!(table.claim(h, None).err(), Some(HandleError::Deleted));
}

#[test]
fn test_concurrent_claims_balance() {
    let table = Arc::new(HandleTable::new(16));
    let h = table.create(kind(2), 0u64).expect("create");

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let pin = table.pin(h, Some(kind(2))).expect("pin");
                    assert_eq!(*pin, 0);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().expect("worker");
    }
    table
        .delete(h, Duration::ZERO)
        .expect("every claim was released");
}

#[test]
fn test_table_full_is_out_of_resources() {
    let table = HandleTable::new(2);
    table.create(kind(1), 1).expect("first");
    table.create(kind(1), 2).expect("second");
    assert_eq!(
        table.create(kind(1), 3).err(),
        Some(HandleError::OutOfResources)
    );
}

// ============================================================================
// Entity handles
// ============================================================================

#[test]
fn test_entity_handles_report_kind() {
    let pp = dds::create_participant(0, None, None).expect("participant");
    let ws = dds::create_waitset(pp).expect("waitset");
    let gc = dds::create_guardcondition(pp).expect("guard");

    assert_eq!(dds::get_kind(pp).expect("kind"), EntityKind::Participant);
    assert_eq!(dds::get_kind(ws).expect("kind"), EntityKind::Waitset);
    assert_eq!(dds::get_kind(gc).expect("kind"), EntityKind::GuardCondition);

    // Guard condition operations on a waitset handle are kind errors.
    let err = dds::set_guardcondition(ws, true).expect_err("kind mismatch");
    assert_eq!(err.return_code(), ReturnCode::IllegalOperation);

    dds::delete(pp).expect("delete participant");
}

#[test]
fn test_deleted_entity_is_already_deleted() {
    let pp = dds::create_participant(0, None, None).expect("participant");
    let gc = dds::create_guardcondition(pp).expect("guard");
    dds::delete(pp).expect("delete participant");

    for e in [pp, gc] {
        let err = dds::get_kind(e).expect_err("deleted");
        assert_eq!(err.return_code(), ReturnCode::AlreadyDeleted);
    }
    let err = dds::delete(gc).expect_err("children go with their parent");
    assert_eq!(err.return_code(), ReturnCode::AlreadyDeleted);
}

#[test]
fn test_non_handle_values_are_bad_parameter() {
    for raw in [0, -1, i32::MIN] {
        let err = dds::get_kind(Entity::from_raw(raw)).expect_err("not a handle");
        assert_eq!(err.return_code(), ReturnCode::BadParameter);
    }
}

#[test]
fn test_random_operations_match_model() {
    let table = HandleTable::new(32);
    let mut rng = fastrand::Rng::with_seed(0x00c0_ffee);
    let mut live: Vec<(Handle, u32)> = Vec::new();
    let mut dead: Vec<Handle> = Vec::new();

    for step in 0..2_000u32 {
        match rng.u8(..4) {
            0 if live.len() < 32 => {
                let h = table.create(kind(3), step).expect("room left");
                assert!(live.iter().all(|(l, _)| *l != h), "handle reused while live");
                live.push((h, step));
            }
            1 if !live.is_empty() => {
                let (h, value) = live.swap_remove(rng.usize(..live.len()));
                let got = table.delete(h, Duration::ZERO).expect("unclaimed delete");
                assert_eq!(*got, value);
                dead.push(h);
            }
            2 if !live.is_empty() => {
                let (h, value) = live[rng.usize(..live.len())];
                assert_eq!(*table.claim(h, Some(kind(3))).expect("live claim"), value);
                table.release(h);
            }
            3 if !dead.is_empty() => {
                let h = dead[rng.usize(..dead.len())];
                assert_eq!(table.claim(h, None).err(), Some(HandleError::Deleted));
            }
            _ => {}
        }
        assert_eq!(table.len(), live.len());
    }
}
