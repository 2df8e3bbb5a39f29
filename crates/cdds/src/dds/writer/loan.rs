// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer loans.
//!
//! A loan is a sample the writer hands out for the application to fill in
//! place, backed by a block of the writer's data allocator. It ends either
//! by [`write_loan`] (publish) or by [`return_writer_loan`] (cancel).

use super::{pin_writer, write_impl};
use crate::core::serdata::{SerdataKind, TopicType};
use crate::dds::allocator::LoanBuffer;
use crate::dds::entity::{self, EntityKind};
use crate::dds::time;
use crate::dds::{Entity, Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Sample lent by a writer.
///
/// Dropping it without [`write_loan`] or [`return_writer_loan`] cancels it.
#[derive(Debug)]
#[must_use = "a dropped loan is cancelled"]
pub struct WriterLoan<T> {
    id: u64,
    writer: Entity,
    outstanding: Weak<Mutex<HashSet<u64>>>,
    sample: Box<T>,
    _block: LoanBuffer,
}

impl<T> WriterLoan<T> {
    /// Writer the loan came from.
    pub fn writer(&self) -> Entity {
        self.writer
    }
}

impl<T> Drop for WriterLoan<T> {
    fn drop(&mut self) {
        if let Some(outstanding) = self.outstanding.upgrade() {
            outstanding.lock().remove(&self.id);
        }
    }
}

impl<T> Deref for WriterLoan<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.sample
    }
}

impl<T> DerefMut for WriterLoan<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.sample
    }
}

fn next_loan_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Borrow a default-initialized sample from `writer`.
pub fn request_loan<T: TopicType>(writer: Entity) -> Result<WriterLoan<T>> {
    let node = pin_writer(writer)?;
    let wr = node.writer()?;
    let sample = wr
        .sertype
        .alloc_sample()
        .downcast::<T>()
        .map_err(|_| Error::bad_param("sample type differs from the writer's type"))?;
    let block = wr.allocator.alloc(std::mem::size_of::<T>().max(1))?;
    let id = next_loan_id();
    wr.loans.lock().insert(id);
    log::trace!("[writer] {} lent sample {}", writer, id);
    Ok(WriterLoan {
        id,
        writer,
        outstanding: Arc::downgrade(&wr.loans),
        sample,
        _block: block,
    })
}

/// Publish a loaned sample, ending the loan.
pub fn write_loan<T: TopicType>(writer: Entity, loan: WriterLoan<T>) -> Result<()> {
    {
        let node = pin_writer(writer)?;
        if loan.writer != writer || !node.writer()?.loans.lock().remove(&loan.id) {
            return Err(Error::precondition("loan is not outstanding on this writer"));
        }
    }
    write_impl(
        writer,
        &*loan.sample,
        SerdataKind::Data,
        0,
        time::time_now(),
    )
    .map(|_| ())
}

/// Cancel loans without publishing them.
///
/// Stops at the first slot that does not hold a loan outstanding on
/// `writer` and fails with [`Error::LoanNotOutstanding`] naming its index;
/// the slots before it have been returned and emptied, the rest are left
/// untouched.
pub fn return_writer_loan<T: TopicType>(
    writer: Entity,
    loans: &mut [Option<WriterLoan<T>>],
) -> Result<()> {
    let node = entity::pin_kind(writer, EntityKind::Writer)?;
    let wr = node.writer()?;
    for (index, slot) in loans.iter_mut().enumerate() {
        let valid = slot
            .as_ref()
            .is_some_and(|l| l.writer == writer && wr.loans.lock().contains(&l.id));
        if !valid {
            log::debug!("[writer] {} loan at index {} not outstanding", writer, index);
            return Err(Error::LoanNotOutstanding { index });
        }
        // Dropping the loan takes its id out of the outstanding set.
        drop(slot.take());
    }
    Ok(())
}
