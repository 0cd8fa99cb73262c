//! Measured-channel edge debouncing.

use gf_common::time::Tick;

/// Rejects measured edges that follow the last accepted edge too closely.
///
/// An edge is accepted when no edge has been accepted yet, or when at least
/// `threshold_us` microseconds have elapsed since the last accepted one.
/// Edges on a channel arrive in counter order, so the distance is measured
/// forward through any wrap and an idle gap of any length below 2^32 us
/// never blocks the next edge.
#[derive(Debug, Clone)]
pub struct Debouncer {
    threshold_us: u32,
    last_accepted: Option<Tick>,
}

impl Debouncer {
    /// Create a debouncer with the given threshold in microseconds.
    #[must_use]
    pub fn new(threshold_us: u32) -> Self {
        Self {
            threshold_us,
            last_accepted: None,
        }
    }

    /// Offer an edge. Returns `true` and remembers the tick if accepted.
    pub fn accept(&mut self, tick: Tick) -> bool {
        let accepted = match self.last_accepted {
            None => true,
            Some(last) => tick.forward_micros_since(last) >= self.threshold_us,
        };
        if accepted {
            self.last_accepted = Some(tick);
        }
        accepted
    }

    /// Tick of the most recently accepted edge.
    #[must_use]
    pub fn last_accepted(&self) -> Option<Tick> {
        self.last_accepted
    }

    /// Configured threshold in microseconds.
    #[must_use]
    pub fn threshold_us(&self) -> u32 {
        self.threshold_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_edge_always_accepted() {
        let mut deb = Debouncer::new(8_000);
        assert!(deb.accept(Tick(123)));
        assert_eq!(deb.last_accepted(), Some(Tick(123)));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut deb = Debouncer::new(8_000);
        assert!(deb.accept(Tick(0)));
        assert!(!deb.accept(Tick(7_999)));
        assert!(deb.accept(Tick(8_000)));
    }

    #[test]
    fn test_rejection_has_no_side_effects() {
        let mut deb = Debouncer::new(8_000);
        deb.accept(Tick(10_000));
        assert!(!deb.accept(Tick(11_000)));
        assert!(!deb.accept(Tick(17_000)));
        assert_eq!(deb.last_accepted(), Some(Tick(10_000)));
        // Measured from the accepted edge, not the rejected ones
        assert!(deb.accept(Tick(18_000)));
    }

    #[test]
    fn test_across_wraparound() {
        let mut deb = Debouncer::new(8_000);
        let before = Tick(u32::MAX - 2_000);
        assert!(deb.accept(before));
        assert!(!deb.accept(before.wrapping_add_micros(5_000)));
        assert!(deb.accept(before.wrapping_add_micros(10_000)));
    }

    #[test]
    fn test_accepts_after_gap_longer_than_half_wrap() {
        let mut deb = Debouncer::new(8_000);
        let last = Tick(1_000_000);
        assert!(deb.accept(last));

        // 40 minutes of silence, past the signed 32-bit horizon
        let resumed = last.wrapping_add_micros(2_400_000_000);
        assert!(deb.accept(resumed));
        assert!(!deb.accept(resumed.wrapping_add_micros(7_999)));
        assert!(deb.accept(resumed.wrapping_add_micros(10_000)));
        assert_eq!(deb.last_accepted(), Some(resumed.wrapping_add_micros(10_000)));
    }

    #[test]
    fn test_distance_is_measured_forward() {
        let mut deb = Debouncer::new(8_000);
        assert!(deb.accept(Tick(50_000)));
        // A smaller raw value is a full counter cycle later, not an earlier edge
        assert!(deb.accept(Tick(40_000)));
        assert_eq!(deb.last_accepted(), Some(Tick(40_000)));
    }

    #[test]
    fn test_zero_threshold_accepts_repeated_tick() {
        let mut deb = Debouncer::new(0);
        assert!(deb.accept(Tick(50_000)));
        assert!(deb.accept(Tick(50_000)));
    }
}
