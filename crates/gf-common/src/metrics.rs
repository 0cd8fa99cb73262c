//! Lock-free counters for edge and estimate activity.
//!
//! Incremented from the edge thread with relaxed atomics so that the
//! notification paths stay non-blocking; read by publishers as a snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine activity counters.
#[derive(Debug, Default)]
pub struct EngineCounters {
    measured_accepted: AtomicU64,
    measured_rejected: AtomicU64,
    reference_edges: AtomicU64,
    estimates: AtomicU64,
    skipped_insufficient: AtomicU64,
    skipped_degenerate: AtomicU64,
}

/// Point-in-time copy of [`EngineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// Measured edges accepted by the debouncer.
    pub measured_accepted: u64,
    /// Measured edges rejected as bounce.
    pub measured_rejected: u64,
    /// Reference edges observed.
    pub reference_edges: u64,
    /// Estimates written to the store.
    pub estimates: u64,
    /// Reference edges that produced no estimate for lack of data.
    pub skipped_insufficient: u64,
    /// Reference edges skipped because of a zero-length interval.
    pub skipped_degenerate: u64,
}

impl EngineCounters {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measured edge and whether it was accepted.
    #[inline]
    pub fn record_measured(&self, accepted: bool) {
        if accepted {
            self.measured_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.measured_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a reference edge.
    #[inline]
    pub fn record_reference(&self) {
        self.reference_edges.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful estimate.
    #[inline]
    pub fn record_estimate(&self) {
        self.estimates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped computation.
    #[inline]
    pub fn record_skip(&self, degenerate: bool) {
        if degenerate {
            self.skipped_degenerate.fetch_add(1, Ordering::Relaxed);
        } else {
            self.skipped_insufficient.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            measured_accepted: self.measured_accepted.load(Ordering::Relaxed),
            measured_rejected: self.measured_rejected.load(Ordering::Relaxed),
            reference_edges: self.reference_edges.load(Ordering::Relaxed),
            estimates: self.estimates.load(Ordering::Relaxed),
            skipped_insufficient: self.skipped_insufficient.load(Ordering::Relaxed),
            skipped_degenerate: self.skipped_degenerate.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = EngineCounters::new();
        assert_eq!(counters.snapshot(), CountersSnapshot::default());
    }

    #[test]
    fn test_record_paths() {
        let counters = EngineCounters::new();
        counters.record_measured(true);
        counters.record_measured(true);
        counters.record_measured(false);
        counters.record_reference();
        counters.record_estimate();
        counters.record_skip(false);
        counters.record_skip(true);

        let snap = counters.snapshot();
        assert_eq!(snap.measured_accepted, 2);
        assert_eq!(snap.measured_rejected, 1);
        assert_eq!(snap.reference_edges, 1);
        assert_eq!(snap.estimates, 1);
        assert_eq!(snap.skipped_insufficient, 1);
        assert_eq!(snap.skipped_degenerate, 1);
    }
}
