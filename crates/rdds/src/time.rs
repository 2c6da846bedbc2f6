// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Time representation: 64-bit nanosecond counts with an infinity sentinel.
//!
//! [`Duration`] is a relative span, [`Time`] an absolute wall-clock instant.
//! `i64::MAX` is the reserved infinity/never sentinel in both; arithmetic
//! saturates into it rather than wrapping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Relative time span in nanoseconds. `Duration::INFINITY` never elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    /// Zero-length span: blocking calls turn into non-blocking probes.
    pub const ZERO: Duration = Duration(0);
    /// Sentinel for an indefinite wait.
    pub const INFINITY: Duration = Duration(i64::MAX);

    #[must_use]
    pub const fn from_nanos(ns: i64) -> Self {
        Duration(ns)
    }

    #[must_use]
    pub const fn from_micros(us: i64) -> Self {
        Duration(us.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Duration(ms.saturating_mul(1_000_000))
    }

    #[must_use]
    pub const fn from_secs(s: i64) -> Self {
        Duration(s.saturating_mul(1_000_000_000))
    }

    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_infinite(self) -> bool {
        self.0 == i64::MAX
    }

    /// Negative durations are rejected by QoS validation.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert to a std duration for blocking primitives; `None` if infinite.
    #[must_use]
    pub fn to_std(self) -> Option<std::time::Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(std::time::Duration::from_nanos(self.0.max(0) as u64))
        }
    }
}

/// Absolute wall-clock time, nanoseconds since the Unix epoch.
/// `Time::NEVER` is the unreachable deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Sentinel instant that never arrives.
    pub const NEVER: Time = Time(i64::MAX);
    /// The epoch itself; useful as a "no expiry recorded" marker.
    pub const ZERO: Time = Time(0);

    #[must_use]
    pub const fn from_nanos(ns: i64) -> Self {
        Time(ns)
    }

    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_never(self) -> bool {
        self.0 == i64::MAX
    }

    /// Saturating advance; adding anything to `NEVER`, or `INFINITY` to
    /// anything, stays `NEVER`.
    #[must_use]
    pub fn checked_add_duration(self, d: Duration) -> Time {
        if self.is_never() || d.is_infinite() {
            Time::NEVER
        } else {
            Time(self.0.saturating_add(d.as_nanos()))
        }
    }

    /// Span from `earlier` to `self`; zero if `earlier` is later.
    #[must_use]
    pub fn duration_since(self, earlier: Time) -> Duration {
        if self.is_never() {
            Duration::INFINITY
        } else {
            Duration::from_nanos(self.0.saturating_sub(earlier.0).max(0))
        }
    }
}

/// Current wall-clock time.
#[must_use]
pub fn now() -> Time {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(std::time::Duration::ZERO);
    Time(i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_constructors() {
        assert_eq!(Duration::from_secs(1).as_nanos(), 1_000_000_000);
        assert_eq!(Duration::from_millis(2).as_nanos(), 2_000_000);
        assert_eq!(Duration::from_micros(3).as_nanos(), 3_000);
        assert_eq!(Duration::from_nanos(4).as_nanos(), 4);
    }

    #[test]
    fn test_duration_infinity() {
        assert!(Duration::INFINITY.is_infinite());
        assert!(!Duration::from_secs(1).is_infinite());
        assert_eq!(Duration::INFINITY.to_std(), None);
    }

    #[test]
    fn test_duration_negative() {
        assert!(Duration::from_nanos(-1).is_negative());
        assert!(!Duration::ZERO.is_negative());
    }

    #[test]
    fn test_time_add_saturates() {
        let t = Time::from_nanos(100);
        assert_eq!(t.checked_add_duration(Duration::from_nanos(50)).as_nanos(), 150);
        assert!(t.checked_add_duration(Duration::INFINITY).is_never());
        assert!(Time::NEVER.checked_add_duration(Duration::ZERO).is_never());
    }

    #[test]
    fn test_time_duration_since() {
        let a = Time::from_nanos(100);
        let b = Time::from_nanos(250);
        assert_eq!(b.duration_since(a).as_nanos(), 150);
        assert_eq!(a.duration_since(b).as_nanos(), 0);
    }

    #[test]
    fn test_now_is_past_2020() {
        // 2020-01-01 in nanoseconds since epoch
        assert!(now().as_nanos() > 1_577_836_800_000_000_000);
    }
}
