// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Category-based logging.
//!
//! Messages carry a [`LogCategory`]; a global mask decides which categories
//! reach the installed [`Output`]. FATAL, ERROR, WARNING and INFO form the
//! default mask, everything else is trace output that has to be switched on
//! (`set_log_mask`, the `log_categories` setting, or `CDDS_LOG_MASK`).
//!
//! ## Example
//!
//! ```ignore
//! use cdds::logging::{init_logger, ConsoleOutput, LogCategory};
//! use std::sync::Arc;
//!
//! let console = Arc::new(ConsoleOutput::new(LogCategory::ALL));
//! init_logger(console, LogCategory::DEFAULT | LogCategory::RHC);
//!
//! cdds::dds_log!(LogCategory::RHC, "instance {:#x} dropped", iid);
//! ```
//!
//! `dds_log!` compiles to nothing without the `logging` feature.
//! [`dds_fatal!`](crate::dds_fatal) is always compiled in: it logs and
//! aborts the process.
//!
//! Diagnostics inside the crate go through the `log` facade as well, so an
//! application logger (env_logger, tracing-log, ...) sees them too.

pub mod logger;
mod output;

pub use logger::{fatal, flush_logger, init_logger, is_enabled, log_mask, log_message, set_log_mask};
pub use output::{ConsoleOutput, FileOutput, LogCategory, Output};

/// Category-tagged log message.
///
/// Formatted the same as `println!()`. Only emitted if compiled with the
/// `logging` feature and the category is in the mask.
///
/// # Example
/// ```ignore
/// dds_log!(LogCategory::TOPIC, "topic {} created", name);
/// ```
#[macro_export]
#[cfg(feature = "logging")]
macro_rules! dds_log {
    ($cat:expr, $($arg:tt)*) => {
        if $crate::logging::is_enabled($cat) {
            let _ = $crate::logging::log_message($cat, &format!($($arg)*));
        }
    };
}

/// No-op log macro (when logging feature disabled).
#[macro_export]
#[cfg(not(feature = "logging"))]
macro_rules! dds_log {
    ($cat:expr, $($arg:tt)*) => {{
        let _ = &$cat;
    }};
}

/// Function entry trace marker, logged under [`LogCategory::TRACE`].
///
/// Only active when both `logging` AND `trace` features are enabled.
#[macro_export]
#[cfg(all(feature = "logging", feature = "trace"))]
macro_rules! trace_fn {
    ($fn_name:expr) => {
        $crate::dds_log!($crate::logging::LogCategory::TRACE, "[ENTER:FNC] {}", $fn_name)
    };
}

/// No-op trace macro (when trace feature disabled).
#[macro_export]
#[cfg(not(all(feature = "logging", feature = "trace")))]
macro_rules! trace_fn {
    ($fn_name:expr) => {};
}

/// Log a fatal condition and abort. Active regardless of features.
#[macro_export]
macro_rules! dds_fatal {
    ($($arg:tt)*) => {
        $crate::logging::fatal(&format!($($arg)*))
    };
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        dds_log!(LogCategory::ERROR, "error message");
        dds_log!(LogCategory::RHC | LogCategory::WHC, "with args: {}", 42);
        trace_fn!("test_macros_compile");
    }
}
