// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/take family.
//!
//! Every operation accepts a reader or one of its read/query conditions
//! (the `*_next` variants accept readers only) and comes in a `read` flavour
//! that marks returned samples READ and a `take` flavour that removes them.
//!
//! | Suffix | Meaning |
//! |--------|---------|
//! | `_mask` | only samples whose states match the [`ReadMask`] |
//! | `_instance` | only samples of one instance |
//! | `_wl` | samples are lent by the reader, give them back with [`return_loan`] |
//! | `cdr` | serdata instead of typed samples |
//!
//! Each call resets DATA_AVAILABLE on the reader and DATA_ON_READERS on its
//! subscriber. A call that returns no data leaves loans as they were.

use super::LoanCache;
use crate::core::handles::Pinned;
use crate::core::serdata::{SerdataRef, TopicType};
use crate::dds::entity::{self, EntityBody, EntityNode, InstanceHandle, HANDLE_NIL};
use crate::dds::read_condition::{ReadCondition, ReadMask};
use crate::dds::rhc::{ReadResult, SampleInfo};
use crate::dds::{Entity, Error, Result, StatusMask};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Samples lent by a reader through one of the `_wl` operations.
///
/// Dropping a loan instead of returning it keeps the reader's cached buffer
/// lent out; later loans then get fresh buffers.
#[derive(Debug)]
pub struct ReaderLoan<T> {
    id: u64,
    reader: Entity,
    samples: Vec<T>,
    infos: Vec<SampleInfo>,
    cached: bool,
}

impl<T> ReaderLoan<T> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn infos(&self) -> &[SampleInfo] {
        &self.infos
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &SampleInfo)> {
        self.samples.iter().zip(self.infos.iter())
    }

    /// Reader the samples came from.
    pub fn reader(&self) -> Entity {
        self.reader
    }
}

/// Buffers kept in a reader's loan cache between loans.
struct LoanBuffers<T> {
    samples: Vec<T>,
    infos: Vec<SampleInfo>,
}

impl<T> Default for LoanBuffers<T> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            infos: Vec::new(),
        }
    }
}

fn next_loan_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Core
// ============================================================================

/// A pinned reader or condition plus the reader it reads from.
struct Target {
    _pin: Pinned<'static, EntityNode>,
    reader: Arc<EntityNode>,
    cond: Option<Arc<ReadCondition>>,
}

fn resolve(entity: Entity, only_reader: bool) -> Result<Target> {
    let pinned = entity::pin(entity)?;
    let (reader, cond) = match &pinned.body {
        EntityBody::Reader(_) => (pinned.arc(), None),
        EntityBody::ReadCondition(cond) if !only_reader => {
            let reader = pinned.parent.clone().ok_or(Error::IllegalOperation)?;
            (reader, Some(Arc::clone(cond)))
        }
        _ => return Err(Error::IllegalOperation),
    };
    Ok(Target {
        _pin: pinned,
        reader,
        cond,
    })
}

fn fetch(
    target: &Target,
    take: bool,
    maxs: usize,
    mask: ReadMask,
    instance: Option<InstanceHandle>,
) -> Result<Vec<ReadResult>> {
    let node = &target.reader;
    node.ensure_enabled()?;
    let mask = mask.validate()?;
    let rd = node.reader()?;

    node.status.reset(StatusMask::DATA_AVAILABLE);
    if let Some(sub) = node.parent.as_deref() {
        sub.status.reset(StatusMask::DATA_ON_READERS);
    }

    let mut rhc = rd.rhc.lock();
    if let Some(ih) = instance {
        if !rhc.contains_instance(ih) {
            return Err(Error::precondition(format!("unknown instance {:#x}", ih)));
        }
    }
    let cond = target.cond.as_deref();
    let out = if take {
        rhc.take(maxs, mask, instance, cond)
    } else {
        rhc.read(maxs, mask, instance, cond)
    };
    drop(rhc);

    if take && !out.is_empty() {
        rd.space.notify_all();
    }
    log::trace!(
        "[read] {} {} sample(s) from {}",
        if take { "took" } else { "read" },
        out.len(),
        node.handle
    );
    Ok(out)
}

fn check_type<T: TopicType>(node: &EntityNode) -> Result<()> {
    if node.reader()?.sertype.alloc_sample().is::<T>() {
        Ok(())
    } else {
        Err(Error::bad_param("sample type differs from the reader's type"))
    }
}

fn check_instance(ih: InstanceHandle) -> Result<()> {
    if ih == HANDLE_NIL {
        Err(Error::precondition("instance handle is nil"))
    } else {
        Ok(())
    }
}

/// Convert results into application samples.
///
/// Invalid samples only carry a key: the sample is reset first so no stale
/// non-key fields remain.
fn fill<T: TopicType>(
    results: Vec<ReadResult>,
    samples: &mut [T],
    infos: &mut [SampleInfo],
) -> Result<usize> {
    let n = results.len();
    for ((sd, info), (sample, slot)) in results
        .into_iter()
        .zip(samples.iter_mut().zip(infos.iter_mut()))
    {
        if info.valid_data {
            sd.to_sample(sample as &mut dyn Any)?;
        } else {
            *sample = T::default();
            sd.untyped_to_sample(sample as &mut dyn Any)?;
        }
        *slot = info;
    }
    Ok(n)
}

#[allow(clippy::too_many_arguments)]
fn read_impl<T: TopicType>(
    take: bool,
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    mask: ReadMask,
    instance: Option<InstanceHandle>,
    only_reader: bool,
) -> Result<usize> {
    let bufsz = samples.len().min(infos.len());
    if maxs == 0 || bufsz == 0 || bufsz < maxs {
        return Err(Error::bad_param(format!(
            "buffer of {} for {} sample(s)",
            bufsz, maxs
        )));
    }
    let target = resolve(entity, only_reader)?;
    check_type::<T>(&target.reader)?;
    let results = fetch(&target, take, maxs, mask, instance)?;
    fill(results, samples, infos)
}

fn read_wl_impl<T: TopicType>(
    take: bool,
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    mask: ReadMask,
    instance: Option<InstanceHandle>,
    only_reader: bool,
) -> Result<usize> {
    if loan.is_some() {
        return Err(Error::bad_param("loan slot already holds samples"));
    }
    if maxs == 0 {
        return Err(Error::bad_param("maxs must be at least 1"));
    }
    let target = resolve(entity, only_reader)?;
    check_type::<T>(&target.reader)?;
    let rd = target.reader.reader()?;

    let id = next_loan_id();
    let (mut bufs, cached) = {
        let mut cache = rd.loan.lock();
        if cache.outstanding.is_none() {
            cache.outstanding = Some(id);
            let bufs = cache
                .buffer
                .take()
                .and_then(|b| b.downcast::<LoanBuffers<T>>().ok())
                .map(|b| *b)
                .unwrap_or_default();
            (bufs, true)
        } else {
            (LoanBuffers::default(), false)
        }
    };
    let restore = |cache: &mut LoanCache, bufs: LoanBuffers<T>| {
        if cached {
            cache.outstanding = None;
            cache.buffer = Some(Box::new(bufs));
        }
    };

    let results = match fetch(&target, take, maxs, mask, instance) {
        Ok(results) if !results.is_empty() => results,
        other => {
            restore(&mut rd.loan.lock(), bufs);
            return other.map(|_| 0);
        }
    };

    let n = results.len();
    bufs.samples.clear();
    bufs.samples.resize(n, T::default());
    bufs.infos.clear();
    bufs.infos.resize(n, SampleInfo::default());
    if let Err(e) = fill(results, &mut bufs.samples, &mut bufs.infos) {
        restore(&mut rd.loan.lock(), bufs);
        return Err(e);
    }
    *loan = Some(ReaderLoan {
        id,
        reader: target.reader.handle,
        samples: bufs.samples,
        infos: bufs.infos,
        cached,
    });
    Ok(n)
}

fn readcdr_impl(
    take: bool,
    entity: Entity,
    maxs: usize,
    mask: ReadMask,
    instance: Option<InstanceHandle>,
) -> Result<Vec<(SerdataRef, SampleInfo)>> {
    if maxs == 0 {
        return Err(Error::bad_param("maxs must be at least 1"));
    }
    let target = resolve(entity, false)?;
    fetch(&target, take, maxs, mask, instance)
}

// ============================================================================
// Read
// ============================================================================

/// Read up to `maxs` samples into caller buffers.
pub fn read<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
) -> Result<usize> {
    read_impl(false, entity, samples, infos, maxs, ReadMask::ANY, None, false)
}

pub fn read_mask<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    mask: ReadMask,
) -> Result<usize> {
    read_impl(false, entity, samples, infos, maxs, mask, None, false)
}

pub fn read_instance<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    instance: InstanceHandle,
) -> Result<usize> {
    check_instance(instance)?;
    read_impl(false, entity, samples, infos, maxs, ReadMask::ANY, Some(instance), false)
}

pub fn read_instance_mask<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<usize> {
    check_instance(instance)?;
    read_impl(false, entity, samples, infos, maxs, mask, Some(instance), false)
}

/// Read up to `maxs` samples into a buffer lent by the reader.
pub fn read_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
) -> Result<usize> {
    read_wl_impl(false, entity, loan, maxs, ReadMask::ANY, None, false)
}

pub fn read_mask_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    mask: ReadMask,
) -> Result<usize> {
    read_wl_impl(false, entity, loan, maxs, mask, None, false)
}

pub fn read_instance_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    instance: InstanceHandle,
) -> Result<usize> {
    check_instance(instance)?;
    read_wl_impl(false, entity, loan, maxs, ReadMask::ANY, Some(instance), false)
}

pub fn read_instance_mask_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<usize> {
    check_instance(instance)?;
    read_wl_impl(false, entity, loan, maxs, mask, Some(instance), false)
}

/// Read the next unread sample of a reader.
pub fn read_next<T: TopicType>(
    reader: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
) -> Result<usize> {
    read_impl(false, reader, samples, infos, 1, ReadMask::NOT_READ, None, true)
}

pub fn read_next_wl<T: TopicType>(reader: Entity, loan: &mut Option<ReaderLoan<T>>) -> Result<usize> {
    read_wl_impl(false, reader, loan, 1, ReadMask::NOT_READ, None, true)
}

/// Read up to `maxs` serdata.
pub fn readcdr(entity: Entity, maxs: usize, mask: ReadMask) -> Result<Vec<ReadResult>> {
    readcdr_impl(false, entity, maxs, mask, None)
}

pub fn readcdr_instance(
    entity: Entity,
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<Vec<ReadResult>> {
    check_instance(instance)?;
    readcdr_impl(false, entity, maxs, mask, Some(instance))
}

// ============================================================================
// Take
// ============================================================================

/// Take up to `maxs` samples into caller buffers.
pub fn take<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
) -> Result<usize> {
    read_impl(true, entity, samples, infos, maxs, ReadMask::ANY, None, false)
}

pub fn take_mask<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    mask: ReadMask,
) -> Result<usize> {
    read_impl(true, entity, samples, infos, maxs, mask, None, false)
}

pub fn take_instance<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    instance: InstanceHandle,
) -> Result<usize> {
    check_instance(instance)?;
    read_impl(true, entity, samples, infos, maxs, ReadMask::ANY, Some(instance), false)
}

pub fn take_instance_mask<T: TopicType>(
    entity: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<usize> {
    check_instance(instance)?;
    read_impl(true, entity, samples, infos, maxs, mask, Some(instance), false)
}

pub fn take_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
) -> Result<usize> {
    read_wl_impl(true, entity, loan, maxs, ReadMask::ANY, None, false)
}

pub fn take_mask_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    mask: ReadMask,
) -> Result<usize> {
    read_wl_impl(true, entity, loan, maxs, mask, None, false)
}

pub fn take_instance_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    instance: InstanceHandle,
) -> Result<usize> {
    check_instance(instance)?;
    read_wl_impl(true, entity, loan, maxs, ReadMask::ANY, Some(instance), false)
}

pub fn take_instance_mask_wl<T: TopicType>(
    entity: Entity,
    loan: &mut Option<ReaderLoan<T>>,
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<usize> {
    check_instance(instance)?;
    read_wl_impl(true, entity, loan, maxs, mask, Some(instance), false)
}

/// Take the next unread sample of a reader.
pub fn take_next<T: TopicType>(
    reader: Entity,
    samples: &mut [T],
    infos: &mut [SampleInfo],
) -> Result<usize> {
    read_impl(true, reader, samples, infos, 1, ReadMask::NOT_READ, None, true)
}

pub fn take_next_wl<T: TopicType>(reader: Entity, loan: &mut Option<ReaderLoan<T>>) -> Result<usize> {
    read_wl_impl(true, reader, loan, 1, ReadMask::NOT_READ, None, true)
}

/// Take up to `maxs` serdata.
pub fn takecdr(entity: Entity, maxs: usize, mask: ReadMask) -> Result<Vec<ReadResult>> {
    readcdr_impl(true, entity, maxs, mask, None)
}

pub fn takecdr_instance(
    entity: Entity,
    maxs: usize,
    instance: InstanceHandle,
    mask: ReadMask,
) -> Result<Vec<ReadResult>> {
    check_instance(instance)?;
    readcdr_impl(true, entity, maxs, mask, Some(instance))
}

// ============================================================================
// Loans
// ============================================================================

/// Give samples lent by a `_wl` operation back to the reader.
///
/// `None` is accepted (nothing to return). On success the slot is emptied;
/// a loan the reader does not consider outstanding fails with
/// PRECONDITION_NOT_MET and stays in the slot.
pub fn return_loan<T: TopicType>(entity: Entity, loan: &mut Option<ReaderLoan<T>>) -> Result<()> {
    let target = resolve(entity, false)?;
    let Some(returned) = loan.take() else {
        return Ok(());
    };
    if !returned.cached {
        return Ok(());
    }
    let rd = target.reader.reader()?;
    let mut cache = rd.loan.lock();
    if returned.reader != target.reader.handle || cache.outstanding != Some(returned.id) {
        *loan = Some(returned);
        return Err(Error::precondition("loan is not outstanding on this reader"));
    }
    let ReaderLoan {
        mut samples,
        mut infos,
        ..
    } = returned;
    samples.clear();
    infos.clear();
    cache.outstanding = None;
    cache.buffer = Some(Box::new(LoanBuffers { samples, infos }));
    Ok(())
}
