// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log categories and output sinks (console and file).

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::path::Path;
use std::sync::Mutex;

/// Bit mask of log categories.
///
/// FATAL, ERROR, WARNING and INFO are log categories; every other bit is a
/// trace category.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogCategory(u32);

impl LogCategory {
    pub const NONE: LogCategory = LogCategory(0);

    /// Logged, then the process aborts.
    pub const FATAL: LogCategory = LogCategory(1 << 0);
    pub const ERROR: LogCategory = LogCategory(1 << 1);
    pub const WARNING: LogCategory = LogCategory(1 << 2);
    pub const INFO: LogCategory = LogCategory(1 << 3);
    pub const CONFIG: LogCategory = LogCategory(1 << 4);
    pub const DISCOVERY: LogCategory = LogCategory(1 << 5);
    pub const DATA: LogCategory = LogCategory(1 << 6);
    /// Trace messages without a more specific category.
    pub const TRACE: LogCategory = LogCategory(1 << 7);
    pub const RADMIN: LogCategory = LogCategory(1 << 8);
    pub const TIMING: LogCategory = LogCategory(1 << 9);
    pub const TRAFFIC: LogCategory = LogCategory(1 << 10);
    pub const TOPIC: LogCategory = LogCategory(1 << 11);
    pub const TCP: LogCategory = LogCategory(1 << 12);
    pub const PLIST: LogCategory = LogCategory(1 << 13);
    pub const WHC: LogCategory = LogCategory(1 << 14);
    pub const THROTTLE: LogCategory = LogCategory(1 << 15);
    pub const RHC: LogCategory = LogCategory(1 << 16);
    pub const CONTENT: LogCategory = LogCategory(1 << 17);
    pub const SHM: LogCategory = LogCategory(1 << 18);

    /// Mask in effect until configured otherwise.
    pub const DEFAULT: LogCategory =
        LogCategory(Self::FATAL.0 | Self::ERROR.0 | Self::WARNING.0 | Self::INFO.0);

    /// Every trace category.
    pub const TRACE_MASK: LogCategory = LogCategory(!Self::DEFAULT.0 & Self::ALL.0);

    pub const ALL: LogCategory = LogCategory((1 << 19) - 1);

    const NAMES: [(&'static str, LogCategory); 19] = [
        ("fatal", Self::FATAL),
        ("error", Self::ERROR),
        ("warning", Self::WARNING),
        ("info", Self::INFO),
        ("config", Self::CONFIG),
        ("discovery", Self::DISCOVERY),
        ("data", Self::DATA),
        ("trace", Self::TRACE),
        ("radmin", Self::RADMIN),
        ("timing", Self::TIMING),
        ("traffic", Self::TRAFFIC),
        ("topic", Self::TOPIC),
        ("tcp", Self::TCP),
        ("plist", Self::PLIST),
        ("whc", Self::WHC),
        ("throttle", Self::THROTTLE),
        ("rhc", Self::RHC),
        ("content", Self::CONTENT),
        ("shm", Self::SHM),
    ];

    /// Mask from raw bits; unknown bits are dropped.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        LogCategory(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: LogCategory) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(&self, other: LogCategory) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parse a comma separated list of category names (`"error,warning,rhc"`);
    /// `"all"` selects every category.
    #[must_use]
    pub fn from_names(list: &str) -> Option<LogCategory> {
        let mut mask = LogCategory::NONE;
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                mask |= Self::ALL;
                continue;
            }
            let (_, cat) = Self::NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))?;
            mask |= *cat;
        }
        Some(mask)
    }

    /// Short tag printed in front of a message: the name of the lowest set bit.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, cat)| self.intersects(*cat))
            .map_or("none", |(name, _)| name)
    }
}

impl fmt::Debug for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, cat)| self.contains(*cat))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "LogCategory({})", names.join("|"))
    }
}

impl BitOr for LogCategory {
    type Output = LogCategory;

    fn bitor(self, rhs: LogCategory) -> LogCategory {
        LogCategory(self.0 | rhs.0)
    }
}

impl BitOrAssign for LogCategory {
    fn bitor_assign(&mut self, rhs: LogCategory) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LogCategory {
    type Output = LogCategory;

    fn bitand(self, rhs: LogCategory) -> LogCategory {
        LogCategory(self.0 & rhs.0)
    }
}

impl Not for LogCategory {
    type Output = LogCategory;

    fn not(self) -> LogCategory {
        LogCategory(!self.0 & Self::ALL.0)
    }
}

/// Output destination trait for log messages.
///
/// Implementations must be thread-safe and handle errors gracefully.
pub trait Output: Send + Sync {
    /// Write one message of `category`; the sink adds the line ending.
    fn write(&self, category: LogCategory, message: &str) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()>;
}

fn format_line(category: LogCategory, message: &str) -> String {
    format!("[{:<9}] {}\n", category.tag().to_ascii_uppercase(), message.trim_end())
}

/// Writes to stderr.
///
/// An optional per-sink filter narrows the global mask further.
pub struct ConsoleOutput {
    filter: Mutex<LogCategory>,
}

impl ConsoleOutput {
    pub fn new(filter: LogCategory) -> Self {
        Self {
            filter: Mutex::new(filter),
        }
    }

    /// Replace the per-sink filter.
    ///
    /// # Errors
    /// Returns error only if internal mutex is poisoned (critical failure).
    pub fn set_filter(&self, filter: LogCategory) -> io::Result<()> {
        *self
            .filter
            .lock()
            .map_err(|_| io::Error::other("console output mutex poisoned"))? = filter;
        Ok(())
    }
}

impl Output for ConsoleOutput {
    fn write(&self, category: LogCategory, message: &str) -> io::Result<()> {
        let filter = *self
            .filter
            .lock()
            .map_err(|_| io::Error::other("console output mutex poisoned"))?;
        if !filter.intersects(category) {
            return Ok(());
        }
        eprint!("{}", format_line(category, message));
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Appends to a file, truncated when the sink is created.
pub struct FileOutput {
    file: Mutex<File>,
    filter: LogCategory,
}

impl FileOutput {
    /// # Errors
    /// Returns the I/O error if the file cannot be created.
    pub fn new(path: impl AsRef<Path>, filter: LogCategory) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            filter,
        })
    }
}

impl Output for FileOutput {
    fn write(&self, category: LogCategory, message: &str) -> io::Result<()> {
        if !self.filter.intersects(category) {
            return Ok(());
        }
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("file output mutex poisoned"))?;
        file.write_all(format_line(category, message).as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.file
            .lock()
            .map_err(|_| io::Error::other("file output mutex poisoned"))?
            .flush()
    }
}
