// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time representation.
//!
//! Source timestamps are signed 64-bit nanoseconds since the Unix epoch, the
//! same representation the sample info carries. Relative timeouts use
//! [`Duration`], with [`INFINITY`] meaning "never time out".

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
pub type Time = i64;

/// Timeout that never expires.
pub const INFINITY: Duration = Duration::MAX;

/// Marker for "no timestamp".
pub const TIME_INVALID: Time = i64::MIN;

/// Current wall-clock time.
#[must_use]
pub fn time_now() -> Time {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Monotonic deadline `timeout` from now; `None` when it does not fit (never expires).
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    if timeout == INFINITY {
        return None;
    }
    Instant::now().checked_add(timeout)
}

/// Monotonic deadline for an absolute wall-clock time.
///
/// A time in the past yields "now"; [`i64::MAX`] never expires.
pub(crate) fn deadline_at(abstime: Time) -> Option<Instant> {
    if abstime == i64::MAX {
        return None;
    }
    let now = time_now();
    let delta = u64::try_from(abstime.saturating_sub(now)).unwrap_or(0);
    Instant::now().checked_add(Duration::from_nanos(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_now_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(time_now() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_infinite_deadline() {
        assert!(deadline_after(INFINITY).is_none());
        assert!(deadline_after(Duration::from_millis(5)).is_some());
        assert!(deadline_at(i64::MAX).is_none());
    }

    #[test]
    fn test_past_deadline_is_now() {
        let before = Instant::now();
        let d = deadline_at(0).expect("finite");
        assert!(d >= before);
        assert!(d <= Instant::now());
    }
}
