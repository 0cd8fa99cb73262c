//! Reference-clock drift calibration.

use gf_common::time::Tick;

/// Tracks the interval between consecutive reference edges.
///
/// The first edge only establishes a baseline. Every later edge yields the
/// elapsed seconds since the previous one, nominally 1.0 for a 1 Hz
/// reference; values above 1.0 mean the reference runs slow (or an edge was
/// missed) and the frequency estimate is scaled down accordingly.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCalibrator {
    last_tick: Option<Tick>,
    base_time_s: Option<f64>,
}

impl ReferenceCalibrator {
    /// Create a calibrator with no baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a reference edge; returns the new base time in seconds, or
    /// `None` for the baseline edge.
    pub fn on_reference_edge(&mut self, tick: Tick) -> Option<f64> {
        let prior = self.last_tick.replace(tick)?;
        let dt = tick.secs_since(prior);
        self.base_time_s = Some(dt);
        Some(dt)
    }

    /// Most recently derived base time in seconds.
    #[must_use]
    pub fn base_time_s(&self) -> Option<f64> {
        self.base_time_s
    }

    /// Last observed reference tick.
    #[must_use]
    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }
}
