//! Frequency computation from edge history and reference calibration.
//!
//! Two algorithms are available:
//!
//! - [`Algorithm::Span`]: `(count - 1) / span_seconds` measured edges per
//!   second over the whole history, divided by the reference base time and
//!   by the number of edges per signal period.
//! - [`Algorithm::CountWindow`]: edges counted between consecutive reference
//!   edges, summed over a sliding window of intervals and divided by the
//!   summed base times.
//!
//! Both return an [`EstimateSkip`] instead of a value when the inputs cannot
//! support an estimate; nothing here panics or divides by zero.

use crate::history::Span;
use gf_common::config::{Algorithm, EngineConfig};
use std::collections::VecDeque;
use thiserror::Error;

/// Why a reference edge produced no estimate.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EstimateSkip {
    /// First reference edge; only a baseline was recorded.
    #[error("no reference baseline yet")]
    NoBaseline,

    /// Fewer than two measured edges in the history.
    #[error("insufficient data: {samples} measured samples")]
    InsufficientData {
        /// Samples currently held.
        samples: usize,
    },

    /// The count window has not yet seen enough reference intervals.
    #[error("count window filling: {have} of {need} intervals")]
    WindowFilling {
        /// Intervals collected so far.
        have: usize,
        /// Intervals required.
        need: usize,
    },

    /// Oldest and newest measured edges share a tick.
    #[error("degenerate measured span: zero duration")]
    DegenerateSpan,

    /// The reference interval is zero, negative, or not finite.
    #[error("degenerate reference interval: {base_time_s}s")]
    DegenerateReference {
        /// Offending base time in seconds.
        base_time_s: f64,
    },
}

impl EstimateSkip {
    /// Degenerate intervals indicate a fault upstream; the rest are transient.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            Self::DegenerateSpan | Self::DegenerateReference { .. }
        )
    }
}

fn check_base_time(base_time_s: f64) -> Result<(), EstimateSkip> {
    if base_time_s.is_finite() && base_time_s > 0.0 {
        Ok(())
    } else {
        Err(EstimateSkip::DegenerateReference { base_time_s })
    }
}

/// Drift-corrected frequency from the history span.
///
/// `samples` is the history length observed together with `span`, used
/// only to describe an [`EstimateSkip::InsufficientData`].
pub fn span_frequency(
    span: Option<Span>,
    samples: usize,
    base_time_s: f64,
    edges_per_cycle: f64,
) -> Result<f64, EstimateSkip> {
    let span = span.ok_or(EstimateSkip::InsufficientData { samples })?;
    if span.count < 2 {
        return Err(EstimateSkip::InsufficientData {
            samples: span.count,
        });
    }

    let dt = span.duration_secs();
    if dt <= 0.0 {
        return Err(EstimateSkip::DegenerateSpan);
    }
    check_base_time(base_time_s)?;

    let measured_hz = (span.count - 1) as f64 / dt;
    Ok(measured_hz / base_time_s / edges_per_cycle)
}

/// Sliding window of per-interval edge counts.
#[derive(Debug, Clone)]
pub struct CountWindow {
    size: usize,
    intervals: VecDeque<(u64, f64)>,
}

impl CountWindow {
    /// Create a window averaging `size` reference intervals (at least 1).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            intervals: VecDeque::with_capacity(size),
        }
    }

    /// Record the edge count of one completed reference interval.
    pub fn push(&mut self, count: u64, base_time_s: f64) {
        if self.intervals.len() == self.size {
            self.intervals.pop_front();
        }
        self.intervals.push_back((count, base_time_s));
    }

    /// Frequency over the full window.
    pub fn frequency(&self, edges_per_cycle: f64) -> Result<f64, EstimateSkip> {
        if self.intervals.len() < self.size {
            return Err(EstimateSkip::WindowFilling {
                have: self.intervals.len(),
                need: self.size,
            });
        }
        let (edges, seconds) = self
            .intervals
            .iter()
            .fold((0u64, 0.0f64), |(n, s), &(c, b)| (n + c, s + b));
        check_base_time(seconds)?;
        Ok(edges as f64 / seconds / edges_per_cycle)
    }

    /// Intervals currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True before the first interval completes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Inputs gathered on a reference edge.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorInput {
    /// Reference interval in seconds.
    pub base_time_s: f64,
    /// History span at the time of the reference edge.
    pub span: Option<Span>,
    /// History length at the time of the reference edge.
    pub samples: usize,
    /// Measured edges accepted since the previous reference edge.
    pub interval_edges: u64,
}

/// Algorithm-selecting estimator driven once per calibrated reference edge.
#[derive(Debug, Clone)]
pub struct FrequencyEstimator {
    algorithm: Algorithm,
    edges_per_cycle: f64,
    window: CountWindow,
}

impl FrequencyEstimator {
    /// Build from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            edges_per_cycle: config.edges_per_cycle,
            window: CountWindow::new(config.count_window),
        }
    }

    /// Selected algorithm.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Compute a frequency in Hz for this reference edge.
    pub fn estimate(&mut self, input: EstimatorInput) -> Result<f64, EstimateSkip> {
        match self.algorithm {
            Algorithm::Span => span_frequency(
                input.span,
                input.samples,
                input.base_time_s,
                self.edges_per_cycle,
            ),
            Algorithm::CountWindow => {
                self.window.push(input.interval_edges, input.base_time_s);
                self.window.frequency(self.edges_per_cycle)
            }
        }
    }
}
