// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking wake-up primitive behind `dds::waitset`.
//!
//! Conditions hold a [`WaitsetSignal`] per attachment and fire it when their
//! trigger may have become true; the waitset blocks in [`WaitsetDriver::wait`]
//! until a signal, a manual notification, a timeout or `close`.

mod driver;

pub use driver::{
    WaitsetDriver, WaitsetError, WaitsetRegistration, WaitsetSignal, WAITSET_DEFAULT_MAX_SLOTS,
};
