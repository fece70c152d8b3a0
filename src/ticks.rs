//! # Wraparound-safe millisecond tick arithmetic.
//!
//! Embedded monotonic clocks are commonly a free-running 32-bit millisecond
//! counter that overflows (every ~49.7 days for u32). Elapsed-time checks
//! must therefore use modular subtraction, never ordered comparison:
//! `now < then` says nothing once the counter has wrapped.
//!
//! [`Monotonic`] is the injection seam for that counter. Production code uses
//! [`SystemTicks`]; tests drive a fake counter across the wrap boundary.
//!
//! ## Rules
//! - Compare spans, not instants: `ticks_diff(now, then) >= window`.
//! - Spans longer than `u32::MAX` ms (~49.7 days) are not representable;
//!   callers keep their windows far below that.

use std::time::Instant;

/// Source of a free-running millisecond counter.
///
/// The counter is expected to wrap at `u32::MAX`; consumers must only ever
/// look at it through [`ticks_diff`].
pub trait Monotonic: Send + Sync {
    /// Current value of the counter, in milliseconds.
    fn ticks_ms(&self) -> u32;
}

/// Milliseconds elapsed from `then` to `now`, correct across counter wrap.
#[inline]
#[must_use]
pub fn ticks_diff(now: u32, then: u32) -> u32 {
    now.wrapping_sub(then)
}

/// Production [`Monotonic`] backed by [`Instant`].
///
/// The elapsed time since construction is truncated to u32 milliseconds,
/// which reproduces the wrap behavior of a hardware tick counter.
pub struct SystemTicks {
    epoch: Instant,
}

impl SystemTicks {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl Monotonic for SystemTicks {
    fn ticks_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_without_wrap() {
        assert_eq!(ticks_diff(1_500, 1_000), 500);
        assert_eq!(ticks_diff(1_000, 1_000), 0);
    }

    #[test]
    fn test_diff_across_wrap() {
        // 5 ms before the wrap to 6 ms after it: 11 ms elapsed.
        assert_eq!(ticks_diff(6, u32::MAX - 4), 11);
    }

    #[test]
    fn test_quiet_period_check_across_wrap() {
        let then = u32::MAX - 100_000;
        let now = then.wrapping_add(300_000);
        assert!(ticks_diff(now, then) >= 300_000);
    }

    #[test]
    fn test_system_ticks_is_monotonic_over_short_spans() {
        let ticks = SystemTicks::new();
        let a = ticks.ticks_ms();
        let b = ticks.ticks_ms();
        assert!(ticks_diff(b, a) < 1_000);
    }
}
