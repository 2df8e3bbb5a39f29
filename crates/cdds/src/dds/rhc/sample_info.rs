// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-sample metadata returned alongside read/take results.

use crate::dds::entity::{InstanceHandle, HANDLE_NIL};
use crate::dds::time::Time;

/// Whether the application has seen this sample before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SampleState {
    Read = 1,
    #[default]
    NotRead = 2,
}

/// Whether this is the first generation of the instance the application sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ViewState {
    #[default]
    New = 4,
    NotNew = 8,
}

/// Liveliness of the instance the sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum InstanceState {
    #[default]
    Alive = 16,
    NotAliveDisposed = 32,
    NotAliveNoWriters = 64,
}

impl SampleState {
    pub(crate) fn of(isread: bool) -> Self {
        if isread {
            SampleState::Read
        } else {
            SampleState::NotRead
        }
    }
}

impl ViewState {
    pub(crate) fn of(isnew: bool) -> Self {
        if isnew {
            ViewState::New
        } else {
            ViewState::NotNew
        }
    }
}

/// Metadata of one returned sample.
///
/// When `valid_data` is false the entry only reports an instance state
/// change; the accompanying sample has nothing but its key fields set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub sample_state: SampleState,
    pub view_state: ViewState,
    pub instance_state: InstanceState,
    pub valid_data: bool,
    pub source_timestamp: Time,
    pub instance_handle: InstanceHandle,
    pub publication_handle: InstanceHandle,
    pub disposed_generation_count: u32,
    pub no_writers_generation_count: u32,
    /// Samples of the same instance following this one in the result.
    pub sample_rank: u32,
    /// Generations between this sample and the instance's last sample in the result.
    pub generation_rank: u32,
    /// Generations between this sample and the instance's current state.
    pub absolute_generation_rank: u32,
}

impl Default for SampleInfo {
    fn default() -> Self {
        Self {
            sample_state: SampleState::default(),
            view_state: ViewState::default(),
            instance_state: InstanceState::default(),
            valid_data: false,
            source_timestamp: 0,
            instance_handle: HANDLE_NIL,
            publication_handle: HANDLE_NIL,
            disposed_generation_count: 0,
            no_writers_generation_count: 0,
            sample_rank: 0,
            generation_rank: 0,
            absolute_generation_rank: 0,
        }
    }
}

impl SampleInfo {
    fn generation_sum(&self) -> u32 {
        self.disposed_generation_count
            .wrapping_add(self.no_writers_generation_count)
    }
}

/// Fill in `sample_rank` and `generation_rank` for the samples of one
/// instance, given in oldest-to-newest order.
pub(crate) fn patch_generations(infos: &mut [SampleInfo]) {
    let Some(last) = infos.last().copied() else {
        return;
    };
    let n = infos.len();
    let last_sum = last.generation_sum();
    for (i, info) in infos.iter_mut().enumerate() {
        info.sample_rank = (n - 1 - i) as u32;
        info.generation_rank = last_sum.wrapping_sub(info.generation_sum());
    }
}
