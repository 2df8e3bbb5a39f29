// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime primitives: the loan slab pool and the waitset driver.

pub mod slabpool;
pub mod waitset;

pub use slabpool::{SlabHandle, SlabPool};
pub use waitset::{
    WaitsetDriver, WaitsetError, WaitsetRegistration, WaitsetSignal, WAITSET_DEFAULT_MAX_SLOTS,
};

use std::sync::{Arc, OnceLock};

static GLOBAL_SLAB_POOL: OnceLock<Arc<SlabPool>> = OnceLock::new();

/// Process-wide slab pool shared by pooled data allocators.
pub fn get_slab_pool() -> Arc<SlabPool> {
    Arc::clone(GLOBAL_SLAB_POOL.get_or_init(|| Arc::new(SlabPool::new())))
}
