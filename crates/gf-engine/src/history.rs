//! Bounded history of accepted measured-edge ticks.
//!
//! A fixed ring buffer allocated once at construction, so recording never
//! allocates on the edge path. When full, the oldest tick is overwritten.

use gf_common::time::{Tick, MICROS_PER_SEC};

/// Extent of the recorded history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Oldest retained tick.
    pub oldest: Tick,
    /// Most recent tick.
    pub newest: Tick,
    /// Number of ticks between and including `oldest` and `newest`.
    pub count: usize,
}

impl Span {
    /// Elapsed seconds from oldest to newest, measured forward through any wrap.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.newest.forward_micros_since(self.oldest)) / MICROS_PER_SEC
    }
}

/// Fixed-capacity FIFO of ticks.
#[derive(Debug, Clone)]
pub struct EdgeHistory {
    /// Ring buffer storage.
    samples: Box<[Tick]>,
    /// Next write position.
    write_pos: usize,
    /// Number of valid entries (saturates at capacity).
    len: usize,
}

impl EdgeHistory {
    /// Create an empty history holding at most `capacity` ticks.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(1);
        Self {
            samples: vec![Tick::default(); size].into_boxed_slice(),
            write_pos: 0,
            len: 0,
        }
    }

    /// Append a tick, evicting the oldest when at capacity.
    pub fn record(&mut self, tick: Tick) {
        self.samples[self.write_pos] = tick;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.len = (self.len + 1).min(self.samples.len());
    }

    /// Oldest and newest tick plus the count, or `None` with fewer than 2 entries.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        if self.len < 2 {
            return None;
        }
        let cap = self.samples.len();
        let oldest = self.samples[(self.write_pos + cap - self.len) % cap];
        let newest = self.samples[(self.write_pos + cap - 1) % cap];
        Some(Span {
            oldest,
            newest,
            count: self.len,
        })
    }

    /// Number of retained ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of retained ticks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Iterate retained ticks from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = Tick> + '_ {
        let cap = self.samples.len();
        let start = (self.write_pos + cap - self.len) % cap;
        (0..self.len).map(move |i| self.samples[(start + i) % cap])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_requires_two_samples() {
        let mut hist = EdgeHistory::new(4);
        assert!(hist.span().is_none());
        hist.record(Tick(10));
        assert!(hist.span().is_none());
        hist.record(Tick(20));
        assert_eq!(
            hist.span(),
            Some(Span {
                oldest: Tick(10),
                newest: Tick(20),
                count: 2
            })
        );
    }

    #[test]
    fn test_fifo_eviction() {
        let mut hist = EdgeHistory::new(3);
        for t in [1, 2, 3, 4, 5] {
            hist.record(Tick(t));
        }
        assert_eq!(hist.len(), 3);
        assert_eq!(hist.iter().collect::<Vec<_>>(), vec![Tick(3), Tick(4), Tick(5)]);

        let span = hist.span().unwrap();
        assert_eq!(span.oldest, Tick(3));
        assert_eq!(span.newest, Tick(5));
        assert_eq!(span.count, 3);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut hist = EdgeHistory::new(1_000);
        for t in 0..5_000u32 {
            hist.record(Tick(t * 10_000));
            assert!(hist.len() <= hist.capacity());
        }
        assert_eq!(hist.len(), 1_000);
        assert_eq!(hist.span().unwrap().oldest, Tick(4_000 * 10_000));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut hist = EdgeHistory::new(0);
        assert_eq!(hist.capacity(), 1);
        hist.record(Tick(1));
        hist.record(Tick(2));
        assert_eq!(hist.len(), 1);
        assert!(hist.span().is_none());
    }

    #[test]
    fn test_span_duration_across_wrap() {
        let mut hist = EdgeHistory::new(16);
        let start = Tick(u32::MAX - 5_000);
        for i in 0..11u32 {
            hist.record(start.wrapping_add_micros(i * 10_000));
        }
        let span = hist.span().unwrap();
        assert!((span.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_span_duration_across_long_gap() {
        let mut hist = EdgeHistory::new(4);
        let before = Tick(3_000_000_000);
        hist.record(before);
        hist.record(before.wrapping_add_micros(2_400_000_000));
        let span = hist.span().unwrap();
        assert!((span.duration_secs() - 2_400.0).abs() < 1e-6);
    }
}
