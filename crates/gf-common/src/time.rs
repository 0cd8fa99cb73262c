//! Monotonic microsecond ticks with wraparound-safe arithmetic.
//!
//! Edge sources timestamp events with a free-running 32-bit microsecond
//! counter (the pigpio tick), which wraps roughly every 71.6 minutes.
//! Ticks are therefore never subtracted directly; all elapsed-time
//! computations go through [`Tick::micros_since`], which interprets the
//! wrapped difference as a signed 32-bit value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds per second, as used for tick-to-seconds conversion.
pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// A monotonic timestamp in microseconds, subject to wraparound at 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u32);

impl Tick {
    /// The largest representable tick; the next tick is `Tick(0)`.
    pub const MAX: Tick = Tick(u32::MAX);

    /// Signed elapsed microseconds from `earlier` to `self`.
    ///
    /// Correct across a counter wrap as long as the true distance is less
    /// than half the counter range (about 35.8 minutes). A negative result
    /// means `self` precedes `earlier`.
    #[inline]
    #[must_use]
    pub const fn micros_since(self, earlier: Tick) -> i64 {
        self.0.wrapping_sub(earlier.0) as i32 as i64
    }

    /// Forward elapsed microseconds from `earlier` to `self`.
    ///
    /// For ticks taken in order from one counter. Valid for any true
    /// distance below 2^32 us (about 71.6 minutes), unlike
    /// [`Tick::micros_since`], which turns negative past half that range.
    #[inline]
    #[must_use]
    pub const fn forward_micros_since(self, earlier: Tick) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Signed elapsed seconds from `earlier` to `self`.
    #[inline]
    #[must_use]
    pub fn secs_since(self, earlier: Tick) -> f64 {
        self.micros_since(earlier) as f64 / MICROS_PER_SEC
    }

    /// Advance the tick by `us` microseconds, wrapping at 2^32.
    #[inline]
    #[must_use]
    pub const fn wrapping_add_micros(self, us: u32) -> Self {
        Self(self.0.wrapping_add(us))
    }

    /// Whether `self` is at or after `other` in wraparound order.
    #[inline]
    #[must_use]
    pub const fn is_at_or_after(self, other: Tick) -> bool {
        self.micros_since(other) >= 0
    }
}

impl From<u32> for Tick {
    fn from(us: u32) -> Self {
        Self(us)
    }
}

impl From<Tick> for u32 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}
