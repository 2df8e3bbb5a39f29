// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::core::rt::WaitsetDriver;
use std::time::{Duration, Instant};

fn soon() -> Option<Instant> {
    Some(Instant::now() + Duration::from_millis(10))
}

#[test]
fn test_status_mask_bits_follow_status_ids() {
    assert_eq!(StatusMask::NONE.bits(), 0);
    assert_eq!(StatusMask::INCONSISTENT_TOPIC.bits(), 1);
    assert_eq!(StatusMask::SAMPLE_REJECTED.bits(), 64);
    assert_eq!(StatusMask::DATA_ON_READERS.bits(), 128);
    assert_eq!(StatusMask::DATA_AVAILABLE.bits(), 256);
    assert_eq!(StatusMask::SUBSCRIPTION_MATCHED.bits(), 4096);
}

#[test]
fn test_valid_masks_per_kind() {
    let reader = StatusMask::valid_for(EntityKind::Reader);
    assert!(reader.contains(StatusMask::DATA_AVAILABLE | StatusMask::SAMPLE_REJECTED));
    assert!(!reader.intersects(StatusMask::PUBLICATION_MATCHED));
    assert_eq!(
        StatusMask::valid_for(EntityKind::Subscriber),
        StatusMask::DATA_ON_READERS
    );
    assert!(StatusMask::valid_for(EntityKind::Waitset).is_empty());
}

#[test]
fn test_status_condition_triggers_on_enabled_bits_only() {
    let cond = StatusCondition::new(StatusMask::DATA_AVAILABLE);
    cond.set(StatusMask::SAMPLE_LOST);
    assert!(!cond.get_trigger_value());
    cond.set(StatusMask::DATA_AVAILABLE);
    assert!(cond.get_trigger_value());

    assert_eq!(
        cond.take(StatusMask::DATA_AVAILABLE),
        StatusMask::DATA_AVAILABLE
    );
    assert!(!cond.get_trigger_value());
    assert_eq!(cond.get_active_statuses(), StatusMask::SAMPLE_LOST);

    cond.set_enabled_statuses(StatusMask::SAMPLE_LOST);
    assert!(cond.get_trigger_value());
    cond.reset(StatusMask::SAMPLE_LOST);
    assert!(!cond.get_trigger_value());
}

#[test]
fn test_status_condition_signals_attached_waitset() {
    let driver = WaitsetDriver::new(4);
    let (slot, id, signal) = driver.register_slot().expect("slot").into_trait();
    let cond = StatusCondition::new(StatusMask::DATA_AVAILABLE);
    cond.add_waitset_signal(Arc::clone(&signal));

    cond.set(StatusMask::SAMPLE_LOST);
    assert!(driver.wait(soon()).is_err());

    cond.set(StatusMask::DATA_AVAILABLE);
    assert_eq!(driver.wait(soon()), Ok(vec![slot]));

    cond.remove_waitset_signal(id);
    cond.reset(StatusMask::DATA_AVAILABLE);
    cond.set(StatusMask::DATA_AVAILABLE);
    assert!(driver.wait(soon()).is_err());
}

#[test]
fn test_guard_condition_set_read_take() {
    let guard = GuardCondition::new();
    assert!(!guard.get_trigger_value());
    guard.set_trigger_value(true);
    assert!(guard.get_trigger_value());
    assert!(guard.take_trigger_value());
    assert!(!guard.get_trigger_value());
    assert!(!guard.take_trigger_value());
}

#[test]
fn test_guard_condition_attached_while_triggered_signals_immediately() {
    let driver = WaitsetDriver::new(4);
    let (slot, _, signal) = driver.register_slot().expect("slot").into_trait();
    let guard = GuardCondition::new();
    guard.set_trigger_value(true);
    guard.add_waitset_signal(signal);
    assert_eq!(driver.wait(soon()), Ok(vec![slot]));
}

#[test]
fn dropped_waitset_signals_are_pruned() {
    let hooks = WaitsetHooks::default();
    let driver = WaitsetDriver::new(4);
    let (_, _, signal) = driver.register_slot().expect("slot").into_trait();
    hooks.attach(Arc::clone(&signal), false);
    assert_eq!(hooks.len(), 1);
    drop(signal);
    hooks.notify();
    assert_eq!(hooks.len(), 0);
}

#[test]
fn test_condition_ids_are_unique() {
    let a = GuardCondition::new();
    let b = GuardCondition::new();
    let c = StatusCondition::new(StatusMask::NONE);
    assert_ne!(a.condition_id(), b.condition_id());
    assert_ne!(b.condition_id(), c.condition_id());
}
