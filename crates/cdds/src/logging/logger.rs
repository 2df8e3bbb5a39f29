// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.
//!
//! One sink, installed once, plus a category mask that can change at any
//! time. The mask starts from the runtime configuration (`log_categories`,
//! which honours `CDDS_LOG_MASK`).

use super::output::{LogCategory, Output};
use crate::config::RuntimeConfig;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Mutex<GlobalLogger>> = OnceLock::new();

/// Global logger state.
struct GlobalLogger {
    output: Arc<dyn Output>,
}

fn mask_cell() -> &'static AtomicU32 {
    static MASK: OnceLock<AtomicU32> = OnceLock::new();
    MASK.get_or_init(|| {
        let bits = RuntimeConfig::global().core().log_categories;
        AtomicU32::new(LogCategory::from_bits(bits).bits())
    })
}

/// Install `output` as the sink and set the category mask.
///
/// Only the first call installs a sink; later calls only update the mask.
pub fn init_logger(output: Arc<dyn Output>, mask: LogCategory) {
    set_log_mask(mask);
    if LOGGER.set(Mutex::new(GlobalLogger { output })).is_err() {
        log::debug!("[logging] logger already initialized, sink unchanged");
    }
}

/// Replace the category mask. FATAL is always part of it.
pub fn set_log_mask(mask: LogCategory) {
    mask_cell().store((mask | LogCategory::FATAL).bits(), Ordering::Relaxed);
}

#[must_use]
pub fn log_mask() -> LogCategory {
    LogCategory::from_bits(mask_cell().load(Ordering::Relaxed))
}

/// Whether a message of `category` would reach the sink.
#[inline]
#[must_use]
pub fn is_enabled(category: LogCategory) -> bool {
    log_mask().intersects(category)
}

/// Write `message` if `category` is enabled.
///
/// Without an installed sink this is a silent no-op.
pub fn log_message(category: LogCategory, message: &str) -> io::Result<()> {
    if !is_enabled(category) {
        return Ok(());
    }
    match LOGGER.get() {
        Some(logger) => logger
            .lock()
            .map_err(|_| io::Error::other("global logger mutex poisoned"))?
            .output
            .write(category, message),
        None => Ok(()),
    }
}

/// Flush the sink. Safe to call before initialization.
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => logger
            .lock()
            .map_err(|_| io::Error::other("global logger mutex poisoned"))?
            .output
            .flush(),
        None => Ok(()),
    }
}

/// Log `message` as FATAL and abort the process.
pub fn fatal(message: &str) -> ! {
    log::error!("[fatal] {}", message);
    if let Some(logger) = LOGGER.get() {
        // A poisoned lock still holds a usable sink.
        let guard = logger.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = guard.output.write(LogCategory::FATAL, message);
        let _ = guard.output.flush();
    } else {
        eprintln!("[FATAL    ] {}", message);
    }
    std::process::abort()
}
