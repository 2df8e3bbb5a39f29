// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reader history cache (RHC).
//!
//! Holds, per instance, the valid samples a reader has received (oldest
//! first) plus at most one *invalid* sample: a key-only entry that reports
//! an instance state change (disposed, no writers) to the application.
//!
//! ```text
//! instances (by instance handle)
//! +-- iid 0x12 ------------------------------------------------+
//! |   writers {w1, w2}   isnew   isdisposed   dg / nwg         |
//! |   samples: [s0 (read)] [s1] [s2]   invalid: none           |
//! +------------------------------------------------------------+
//! +-- iid 0x17 ------------------------------------------------+
//! |   writers {}   disposed                                    |
//! |   samples: []   invalid: (unread)                          |
//! +------------------------------------------------------------+
//! ```
//!
//! The cache also tracks the reader's read and query conditions: each query
//! condition owns one bit of a 64-bit mask, and every stored sample records
//! the bits of the queries it satisfies. Condition triggers are recomputed
//! after every change.

mod sample_info;

pub use sample_info::{InstanceState, SampleInfo, SampleState, ViewState};
pub(crate) use sample_info::patch_generations;

use crate::core::serdata::{
    Serdata, SerdataKind, SerdataRef, SertypeRef, STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER,
};
use crate::core::tkmap::TopicKeyMap;
use crate::dds::condition::Condition;
use crate::dds::entity::InstanceHandle;
use crate::dds::listener::SampleRejectedReason;
use crate::dds::qos::{History, Qos, ResourceLimits};
use crate::dds::read_condition::{InstanceStateMask, ReadCondition, ReadMask, ViewStateMask};
use crate::dds::time::Time;
use crate::logging::LogCategory;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// Result of storing one serdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Accepted and visible to the application: data is available.
    Delivered,
    /// Accepted (or ignored) without anything new to read.
    NoChange,
    /// Refused by a resource limit.
    Rejected {
        reason: SampleRejectedReason,
        instance: InstanceHandle,
    },
}

/// One read/take result: the serdata (key-only for invalid samples) and its info.
pub type ReadResult = (SerdataRef, SampleInfo);

struct RhcSample {
    sd: SerdataRef,
    wr_iid: InstanceHandle,
    isread: bool,
    disposed_gen: u32,
    no_writers_gen: u32,
    /// Query condition bits this sample satisfies.
    conds: u64,
}

struct RhcInstance {
    iid: InstanceHandle,
    /// Key-only serdata; also the payload of the invalid sample.
    tk: SerdataRef,
    samples: VecDeque<RhcSample>,
    inv_exists: bool,
    inv_isread: bool,
    inv_conds: u64,
    isnew: bool,
    isdisposed: bool,
    writers: HashSet<InstanceHandle>,
    /// Most recent writer; `wr_iid_islive` is false once it unregistered.
    wr_iid: InstanceHandle,
    wr_iid_islive: bool,
    disposed_gen: u32,
    no_writers_gen: u32,
    tstamp: Time,
}

enum Unregistered {
    Kept { data_available: bool },
    Dropped,
}

struct Limits {
    history_depth: u32,
    max_samples: Option<u32>,
    max_instances: Option<u32>,
    max_samples_per_instance: Option<u32>,
}

impl Limits {
    fn from_qos(qos: &Qos) -> Self {
        let history_depth = match qos.history_or_default() {
            History::KeepLast(depth) => depth,
            History::KeepAll => u32::MAX,
        };
        let rl = qos.resource_limits_or_default();
        Self {
            history_depth,
            max_samples: ResourceLimits::limit(rl.max_samples),
            max_instances: ResourceLimits::limit(rl.max_instances),
            max_samples_per_instance: ResourceLimits::limit(rl.max_samples_per_instance),
        }
    }
}

/// Attached conditions plus what is needed to evaluate query filters.
struct Conditions {
    sertype: SertypeRef,
    attached: Vec<Arc<ReadCondition>>,
    query_bits: u64,
}

impl Conditions {
    /// Bits of the query conditions (restricted to `only`) accepting `sd`.
    fn eval(&self, sd: &dyn Serdata, key_only: bool, only: u64) -> u64 {
        let wanted = self.query_bits & only;
        if wanted == 0 || self.attached.iter().all(|c| c.query_bit() & wanted == 0) {
            return 0;
        }
        let mut sample = self.sertype.alloc_sample();
        let decoded = if key_only {
            sd.untyped_to_sample(&mut *sample)
        } else {
            sd.to_sample(&mut *sample)
        };
        if let Err(e) = decoded {
            log::warn!("[rhc] cannot evaluate query filters: {}", e);
            return 0;
        }
        let mut bits = 0;
        for cond in &self.attached {
            if let Some(q) = cond.query() {
                if q.bit & wanted != 0 && (q.filter)(&*sample) {
                    bits |= q.bit;
                }
            }
        }
        bits
    }
}

#[derive(Default)]
struct Counts {
    n_vsamples: u32,
    n_invsamples: u32,
}

impl RhcInstance {
    fn new(iid: InstanceHandle, tk: SerdataRef, wr_iid: InstanceHandle, sd: &dyn Serdata) -> Self {
        let mut writers = HashSet::new();
        if sd.statusinfo() & STATUSINFO_UNREGISTER == 0 {
            writers.insert(wr_iid);
        }
        Self {
            iid,
            tk,
            samples: VecDeque::new(),
            inv_exists: false,
            inv_isread: false,
            inv_conds: 0,
            isnew: true,
            isdisposed: sd.statusinfo() & STATUSINFO_DISPOSE != 0,
            wr_iid_islive: !writers.is_empty(),
            writers,
            wr_iid,
            disposed_gen: 0,
            no_writers_gen: 0,
            tstamp: sd.timestamp(),
        }
    }

    fn is_empty(&self) -> bool {
        self.samples.is_empty() && !self.inv_exists
    }

    fn instance_state(&self) -> InstanceState {
        if self.isdisposed {
            InstanceState::NotAliveDisposed
        } else if self.writers.is_empty() {
            InstanceState::NotAliveNoWriters
        } else {
            InstanceState::Alive
        }
    }

    /// View and instance state bits.
    fn qmask(&self) -> u32 {
        let view = if self.isnew {
            ViewStateMask::NEW
        } else {
            ViewStateMask::NOT_NEW
        };
        let instance = match self.instance_state() {
            InstanceState::Alive => InstanceStateMask::ALIVE,
            InstanceState::NotAliveDisposed => InstanceStateMask::NOT_ALIVE_DISPOSED,
            InstanceState::NotAliveNoWriters => InstanceStateMask::NOT_ALIVE_NO_WRITERS,
        };
        view.bits() | instance.bits()
    }

    fn generation_sum(&self) -> u32 {
        self.disposed_gen.wrapping_add(self.no_writers_gen)
    }

    fn register(&mut self, wr_iid: InstanceHandle) {
        if self.wr_iid_islive && self.wr_iid == wr_iid {
            return;
        }
        if self.writers.is_empty() {
            self.no_writers_gen = self.no_writers_gen.wrapping_add(1);
        }
        self.writers.insert(wr_iid);
        self.wr_iid = wr_iid;
        self.wr_iid_islive = true;
    }

    fn clear_invsample(&mut self, counts: &mut Counts) {
        if self.inv_exists {
            self.inv_exists = false;
            self.inv_conds = 0;
            counts.n_invsamples -= 1;
        }
    }

    /// Add an unread invalid sample unless an unread one exists already.
    fn set_invsample(&mut self, counts: &mut Counts, conds: &Conditions) -> bool {
        if self.inv_exists && !self.inv_isread {
            return false;
        }
        self.clear_invsample(counts);
        self.inv_conds = conds.eval(self.tk.as_ref(), true, u64::MAX);
        self.inv_exists = true;
        self.inv_isread = false;
        counts.n_invsamples += 1;
        true
    }

    fn add_sample(
        &mut self,
        limits: &Limits,
        counts: &mut Counts,
        conds: &Conditions,
        wr_iid: InstanceHandle,
        sd: &SerdataRef,
    ) -> Result<(), SampleRejectedReason> {
        if self.samples.len() as u32 == limits.history_depth {
            self.clear_invsample(counts);
            self.samples.pop_front();
        } else {
            if limits.max_samples.is_some_and(|max| counts.n_vsamples >= max) {
                return Err(SampleRejectedReason::SamplesLimit);
            }
            if limits
                .max_samples_per_instance
                .is_some_and(|max| self.samples.len() as u32 >= max)
            {
                return Err(SampleRejectedReason::SamplesPerInstanceLimit);
            }
            self.clear_invsample(counts);
            counts.n_vsamples += 1;
        }
        self.samples.push_back(RhcSample {
            sd: Arc::clone(sd),
            wr_iid,
            isread: false,
            disposed_gen: self.disposed_gen,
            no_writers_gen: self.no_writers_gen,
            conds: conds.eval(sd.as_ref(), false, u64::MAX),
        });
        Ok(())
    }

    fn unregister(
        &mut self,
        counts: &mut Counts,
        conds: &Conditions,
        wr_iid: InstanceHandle,
        tstamp: Time,
    ) -> Unregistered {
        if !self.writers.remove(&wr_iid) {
            return Unregistered::Kept {
                data_available: false,
            };
        }
        if !self.writers.is_empty() {
            if self.wr_iid_islive && self.wr_iid == wr_iid {
                self.wr_iid_islive = false;
            }
            return Unregistered::Kept {
                data_available: false,
            };
        }

        let mut data_available = false;
        if !self.is_empty() {
            if self.samples.back().map_or(true, |s| s.isread) {
                data_available = self.set_invsample(counts, conds);
                self.tstamp = tstamp;
            }
        } else if self.isdisposed {
            return Unregistered::Dropped;
        } else {
            data_available = self.set_invsample(counts, conds);
            self.tstamp = tstamp;
        }
        self.wr_iid_islive = false;
        Unregistered::Kept { data_available }
    }

    fn sample_info(&self, s: &RhcSample) -> SampleInfo {
        SampleInfo {
            sample_state: SampleState::of(s.isread),
            view_state: ViewState::of(self.isnew),
            instance_state: self.instance_state(),
            valid_data: true,
            source_timestamp: s.sd.timestamp(),
            instance_handle: self.iid,
            publication_handle: s.wr_iid,
            disposed_generation_count: s.disposed_gen,
            no_writers_generation_count: s.no_writers_gen,
            sample_rank: 0,
            generation_rank: 0,
            absolute_generation_rank: self
                .generation_sum()
                .wrapping_sub(s.disposed_gen.wrapping_add(s.no_writers_gen)),
        }
    }

    fn invsample_info(&self) -> SampleInfo {
        SampleInfo {
            sample_state: SampleState::of(self.inv_isread),
            view_state: ViewState::of(self.isnew),
            instance_state: self.instance_state(),
            valid_data: false,
            source_timestamp: self.tstamp,
            instance_handle: self.iid,
            publication_handle: self.wr_iid,
            disposed_generation_count: self.disposed_gen,
            no_writers_generation_count: self.no_writers_gen,
            sample_rank: 0,
            generation_rank: 0,
            absolute_generation_rank: 0,
        }
    }

    fn matches(state: u32, excluded: u32, conds: u64, qcmask: u64) -> bool {
        state & excluded == 0 && (qcmask == 0 || conds & qcmask != 0)
    }

    fn has_match(&self, excluded: u32, qcmask: u64) -> bool {
        let inst_mask = self.qmask();
        if inst_mask & excluded != 0 {
            return false;
        }
        self.samples
            .iter()
            .any(|s| Self::matches(inst_mask | sample_bits(s.isread), excluded, s.conds, qcmask))
            || (self.inv_exists
                && Self::matches(
                    inst_mask | sample_bits(self.inv_isread),
                    excluded,
                    self.inv_conds,
                    qcmask,
                ))
    }
}

fn sample_bits(isread: bool) -> u32 {
    SampleState::of(isread) as u32
}

/// History cache of one reader.
pub struct ReaderHistoryCache {
    tkmap: Arc<TopicKeyMap>,
    instances: BTreeMap<InstanceHandle, RhcInstance>,
    limits: Limits,
    counts: Counts,
    conds: Conditions,
}

impl ReaderHistoryCache {
    pub fn new(sertype: SertypeRef, qos: &Qos, tkmap: Arc<TopicKeyMap>) -> Self {
        Self {
            tkmap,
            instances: BTreeMap::new(),
            limits: Limits::from_qos(qos),
            counts: Counts::default(),
            conds: Conditions {
                sertype,
                attached: Vec::new(),
                query_bits: 0,
            },
        }
    }

    fn type_name(&self) -> &str {
        self.conds.sertype.type_name()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Valid samples currently held.
    pub fn sample_count(&self) -> u32 {
        self.counts.n_vsamples
    }

    /// Invalid samples currently held.
    pub fn invalid_sample_count(&self) -> u32 {
        self.counts.n_invsamples
    }

    pub fn contains_instance(&self, iid: InstanceHandle) -> bool {
        self.instances.contains_key(&iid)
    }

    /// Store a sample, dispose and/or unregister from writer `wr_iid` for
    /// instance `iid`.
    pub fn store(&mut self, wr_iid: InstanceHandle, sd: &SerdataRef, iid: InstanceHandle) -> StoreOutcome {
        let statusinfo = sd.statusinfo();
        let has_data = sd.kind() == SerdataKind::Data;
        let is_dispose = statusinfo & STATUSINFO_DISPOSE != 0;
        let is_unregister = statusinfo & STATUSINFO_UNREGISTER != 0;
        log::trace!(
            "[rhc] store iid={:#x} wr={:#x} si={:#x} has_data={}",
            iid,
            wr_iid,
            statusinfo,
            has_data
        );

        if !has_data && statusinfo == 0 {
            // explicit register; registration happens implicitly
            return StoreOutcome::NoChange;
        }

        let outcome = if !self.instances.contains_key(&iid) {
            if !has_data && !is_dispose {
                return StoreOutcome::NoChange;
            }
            self.store_new_instance(wr_iid, sd, iid, has_data)
        } else {
            self.store_existing(wr_iid, sd, iid, has_data, is_dispose, is_unregister)
        };
        self.update_conditions();
        outcome
    }

    fn store_new_instance(
        &mut self,
        wr_iid: InstanceHandle,
        sd: &SerdataRef,
        iid: InstanceHandle,
        has_data: bool,
    ) -> StoreOutcome {
        if self
            .limits
            .max_instances
            .is_some_and(|max| self.instances.len() as u32 >= max)
        {
            log::debug!("[rhc] instance {:#x} rejected: instance limit", iid);
            return StoreOutcome::Rejected {
                reason: SampleRejectedReason::InstancesLimit,
                instance: iid,
            };
        }

        let tk = self.tkmap.get(iid).unwrap_or_else(|| sd.to_untyped());
        let mut inst = RhcInstance::new(iid, tk, wr_iid, sd.as_ref());
        if has_data {
            if let Err(reason) =
                inst.add_sample(&self.limits, &mut self.counts, &self.conds, wr_iid, sd)
            {
                log::debug!("[rhc] first sample of {:#x} rejected: {:?}", iid, reason);
                return StoreOutcome::Rejected {
                    reason,
                    instance: iid,
                };
            }
        } else if inst.isdisposed {
            inst.set_invsample(&mut self.counts, &self.conds);
        }

        self.tkmap
            .lookup_or_register(self.conds.sertype.type_name(), sd.as_ref());
        self.instances.insert(iid, inst);
        StoreOutcome::Delivered
    }

    fn store_existing(
        &mut self,
        wr_iid: InstanceHandle,
        sd: &SerdataRef,
        iid: InstanceHandle,
        has_data: bool,
        is_dispose: bool,
        is_unregister: bool,
    ) -> StoreOutcome {
        let Some(inst) = self.instances.get_mut(&iid) else {
            return StoreOutcome::NoChange;
        };
        let mut outcome = StoreOutcome::NoChange;

        if has_data || is_dispose {
            let not_alive = inst.writers.is_empty() || inst.isdisposed;
            let old_isdisposed = inst.isdisposed;
            let old_isnew = inst.isnew;
            let old_disposed_gen = inst.disposed_gen;
            let (old_wr_iid, old_wr_iid_islive) = (inst.wr_iid, inst.wr_iid_islive);

            inst.register(wr_iid);
            if has_data && not_alive {
                inst.isnew = true;
            }
            if has_data && inst.isdisposed {
                inst.isdisposed = false;
                inst.disposed_gen = inst.disposed_gen.wrapping_add(1);
            }
            let mut became_disposed = false;
            if is_dispose {
                inst.isdisposed = true;
                became_disposed = !old_isdisposed;
            }

            if has_data {
                if let Err(reason) =
                    inst.add_sample(&self.limits, &mut self.counts, &self.conds, wr_iid, sd)
                {
                    log::debug!("[rhc] sample of {:#x} rejected: {:?}", iid, reason);
                    inst.isnew = old_isnew;
                    inst.isdisposed = old_isdisposed;
                    inst.disposed_gen = old_disposed_gen;
                    inst.wr_iid = old_wr_iid;
                    inst.wr_iid_islive = old_wr_iid_islive;
                    outcome = StoreOutcome::Rejected {
                        reason,
                        instance: iid,
                    };
                } else {
                    outcome = StoreOutcome::Delivered;
                }
            }

            if !matches!(outcome, StoreOutcome::Rejected { .. }) {
                if became_disposed
                    && inst.samples.is_empty()
                    && inst.set_invsample(&mut self.counts, &self.conds)
                {
                    outcome = StoreOutcome::Delivered;
                }
                inst.tstamp = sd.timestamp();
                inst.wr_iid = wr_iid;
                inst.wr_iid_islive = true;
            }
        }

        if is_unregister {
            match inst.unregister(&mut self.counts, &self.conds, wr_iid, sd.timestamp()) {
                Unregistered::Kept { data_available } => {
                    if data_available && outcome == StoreOutcome::NoChange {
                        outcome = StoreOutcome::Delivered;
                    }
                }
                Unregistered::Dropped => self.drop_instance(iid),
            }
        }
        outcome
    }

    fn drop_instance(&mut self, iid: InstanceHandle) {
        if let Some(inst) = self.instances.remove(&iid) {
            debug_assert!(inst.is_empty());
            crate::dds_log!(LogCategory::RHC, "[rhc] drop instance {:#x}", iid);
            self.tkmap.unref(self.type_name(), inst.tk.as_ref());
        }
    }

    /// Remove every registration of writer `wr_iid`, disposing its instances
    /// first when `autodispose` is set. Returns whether data became available.
    pub fn unregister_wr(&mut self, wr_iid: InstanceHandle, autodispose: bool) -> bool {
        let registered: Vec<InstanceHandle> = self
            .instances
            .values()
            .filter(|inst| inst.writers.contains(&wr_iid))
            .map(|inst| inst.iid)
            .collect();
        if registered.is_empty() {
            return false;
        }
        log::debug!(
            "[rhc] unregister writer {:#x} from {} instance(s) autodispose={}",
            wr_iid,
            registered.len(),
            autodispose
        );

        let mut data_available = false;
        for iid in registered {
            let Some(inst) = self.instances.get_mut(&iid) else {
                continue;
            };
            if autodispose && !inst.isdisposed {
                inst.isdisposed = true;
                if inst.samples.is_empty() {
                    inst.set_invsample(&mut self.counts, &self.conds);
                }
            }
            let tstamp = inst.tstamp;
            match inst.unregister(&mut self.counts, &self.conds, wr_iid, tstamp) {
                Unregistered::Kept { .. } => data_available = true,
                Unregistered::Dropped => self.drop_instance(iid),
            }
        }
        self.update_conditions();
        data_available
    }

    /// Read up to `maxs` samples matching `mask` (and `cond`, if given),
    /// optionally restricted to one instance. Returned samples become READ.
    pub fn read(
        &mut self,
        maxs: usize,
        mask: ReadMask,
        instance: Option<InstanceHandle>,
        cond: Option<&ReadCondition>,
    ) -> Vec<ReadResult> {
        self.read_w_qminv(false, maxs, mask, instance, cond)
    }

    /// Like [`read`](Self::read), but removes the returned samples.
    pub fn take(
        &mut self,
        maxs: usize,
        mask: ReadMask,
        instance: Option<InstanceHandle>,
        cond: Option<&ReadCondition>,
    ) -> Vec<ReadResult> {
        self.read_w_qminv(true, maxs, mask, instance, cond)
    }

    fn read_w_qminv(
        &mut self,
        take: bool,
        maxs: usize,
        mask: ReadMask,
        instance: Option<InstanceHandle>,
        cond: Option<&ReadCondition>,
    ) -> Vec<ReadResult> {
        let excluded = mask.excluded() | cond.map_or(0, ReadCondition::excluded);
        let qcmask = cond.map_or(0, ReadCondition::query_bit);
        let iids: Vec<InstanceHandle> = match instance {
            Some(iid) => vec![iid],
            None => self.instances.keys().copied().collect(),
        };

        let mut out: Vec<ReadResult> = Vec::new();
        let mut emptied = Vec::new();
        for iid in iids {
            if out.len() >= maxs {
                break;
            }
            let Some(inst) = self.instances.get_mut(&iid) else {
                continue;
            };
            let inst_mask = inst.qmask();
            if inst.is_empty() || inst_mask & excluded != 0 {
                continue;
            }

            let first = out.len();
            let mut i = 0;
            while i < inst.samples.len() && out.len() < maxs {
                let s = &inst.samples[i];
                if !RhcInstance::matches(inst_mask | sample_bits(s.isread), excluded, s.conds, qcmask)
                {
                    i += 1;
                    continue;
                }
                out.push((Arc::clone(&s.sd), inst.sample_info(s)));
                if take {
                    inst.samples.remove(i);
                    self.counts.n_vsamples -= 1;
                } else {
                    inst.samples[i].isread = true;
                    i += 1;
                }
            }

            if inst.inv_exists
                && out.len() < maxs
                && RhcInstance::matches(
                    inst_mask | sample_bits(inst.inv_isread),
                    excluded,
                    inst.inv_conds,
                    qcmask,
                )
            {
                out.push((Arc::clone(&inst.tk), inst.invsample_info()));
                if take {
                    inst.clear_invsample(&mut self.counts);
                } else {
                    inst.inv_isread = true;
                }
            }

            if out.len() > first {
                inst.isnew = false;
                let mut infos: Vec<SampleInfo> = out[first..].iter().map(|(_, info)| *info).collect();
                patch_generations(&mut infos);
                for ((_, info), patched) in out[first..].iter_mut().zip(infos) {
                    *info = patched;
                }
                if take && inst.is_empty() && inst.writers.is_empty() {
                    emptied.push(iid);
                }
            }
        }

        for iid in emptied {
            self.drop_instance(iid);
        }
        if !out.is_empty() {
            log::trace!(
                "[rhc] {} {} sample(s) mask={:#x}",
                if take { "take" } else { "read" },
                out.len(),
                mask.bits()
            );
            self.update_conditions();
        }
        out
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Reserve a query condition bit; `None` when all 64 are in use.
    pub(crate) fn alloc_query_bit(&mut self) -> Option<u64> {
        if self.conds.query_bits == u64::MAX {
            return None;
        }
        let bit = 1u64 << (!self.conds.query_bits).trailing_zeros();
        self.conds.query_bits |= bit;
        Some(bit)
    }

    pub(crate) fn free_query_bit(&mut self, bit: u64) {
        self.conds.query_bits &= !bit;
    }

    pub(crate) fn add_condition(&mut self, cond: Arc<ReadCondition>) {
        let bit = cond.query_bit();
        self.conds.attached.push(Arc::clone(&cond));
        if bit != 0 {
            let conds = &self.conds;
            for inst in self.instances.values_mut() {
                for s in inst.samples.iter_mut() {
                    s.conds |= conds.eval(s.sd.as_ref(), false, bit);
                }
                if inst.inv_exists {
                    inst.inv_conds |= conds.eval(inst.tk.as_ref(), true, bit);
                }
            }
        }
        cond.set_trigger_value(self.has_match(cond.excluded(), bit));
    }

    pub(crate) fn remove_condition(&mut self, cond: &ReadCondition) {
        let id = cond.condition_id();
        self.conds.attached.retain(|c| c.condition_id() != id);
        let bit = cond.query_bit();
        if bit != 0 {
            for inst in self.instances.values_mut() {
                for s in inst.samples.iter_mut() {
                    s.conds &= !bit;
                }
                inst.inv_conds &= !bit;
            }
            self.free_query_bit(bit);
        }
    }

    fn has_match(&self, excluded: u32, qcmask: u64) -> bool {
        self.instances
            .values()
            .any(|inst| inst.has_match(excluded, qcmask))
    }

    /// Recompute the trigger of every attached condition.
    pub(crate) fn update_conditions(&self) {
        for cond in &self.conds.attached {
            cond.set_trigger_value(self.has_match(cond.excluded(), cond.query_bit()));
        }
    }
}

impl Drop for ReaderHistoryCache {
    fn drop(&mut self) {
        let type_name = self.conds.sertype.type_name().to_string();
        for inst in self.instances.values() {
            self.tkmap.unref(&type_name, inst.tk.as_ref());
        }
    }
}

impl std::fmt::Debug for ReaderHistoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHistoryCache")
            .field("type_name", &self.type_name())
            .field("instances", &self.instances.len())
            .field("n_vsamples", &self.counts.n_vsamples)
            .field("n_invsamples", &self.counts.n_invsamples)
            .field("conditions", &self.conds.attached.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
