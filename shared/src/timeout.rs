//! Wait durations for blocking calls.
//!
//! The device API historically encoded "wait forever" as `-1` passed through an
//! unsigned millisecond argument. [`WaitTimeout`] keeps the two cases apart so a
//! blocking call never has to guess what a magic number meant.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a blocking call may suspend the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitTimeout {
    /// Block until the awaited condition is met or the wait is cancelled.
    Infinite,
    /// Block for at most this many milliseconds. Zero polls without blocking.
    Millis(u32),
}

impl WaitTimeout {
    /// Raw DWORD value used by the vendor API for an infinite wait.
    pub const RAW_INFINITE: u32 = u32::MAX;

    /// Interpret a raw millisecond argument.
    ///
    /// Negative values and `0xFFFF_FFFF` (the unsigned spelling of `-1`) mean
    /// infinite. Values above `u32::MAX` are clamped to the largest finite wait.
    pub fn from_raw_millis(raw: i64) -> Self {
        if raw < 0 || raw == Self::RAW_INFINITE as i64 {
            WaitTimeout::Infinite
        } else if raw > (u32::MAX - 1) as i64 {
            WaitTimeout::Millis(u32::MAX - 1)
        } else {
            WaitTimeout::Millis(raw as u32)
        }
    }

    /// Finite duration of this timeout, or `None` when infinite.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            WaitTimeout::Infinite => None,
            WaitTimeout::Millis(ms) => Some(Duration::from_millis(ms as u64)),
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, WaitTimeout::Infinite)
    }
}

impl From<Duration> for WaitTimeout {
    fn from(duration: Duration) -> Self {
        let ms = duration.as_millis().min((u32::MAX - 1) as u128);
        WaitTimeout::Millis(ms as u32)
    }
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WaitTimeout::Infinite => write!(f, "infinite"),
            WaitTimeout::Millis(ms) => write!(f, "{ms} ms"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sentinels_are_infinite() {
        assert_eq!(WaitTimeout::from_raw_millis(-1), WaitTimeout::Infinite);
        assert_eq!(WaitTimeout::from_raw_millis(-500), WaitTimeout::Infinite);
        assert_eq!(
            WaitTimeout::from_raw_millis(0xFFFF_FFFF),
            WaitTimeout::Infinite
        );
    }

    #[test]
    fn test_finite_values_pass_through() {
        assert_eq!(WaitTimeout::from_raw_millis(0), WaitTimeout::Millis(0));
        assert_eq!(WaitTimeout::from_raw_millis(1000), WaitTimeout::Millis(1000));
        assert_eq!(
            WaitTimeout::Millis(250).as_duration(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(WaitTimeout::Infinite.as_duration(), None);
    }

    #[test]
    fn test_oversized_values_clamp_to_finite() {
        let t = WaitTimeout::from_raw_millis(1 << 40);
        assert!(!t.is_infinite());
        assert_eq!(t, WaitTimeout::Millis(u32::MAX - 1));
    }

    #[test]
    fn test_from_duration() {
        assert_eq!(
            WaitTimeout::from(Duration::from_secs(2)),
            WaitTimeout::Millis(2000)
        );
    }
}
