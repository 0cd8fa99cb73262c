//! The frequency engine: explicit owned state behind the edge notifications.
//!
//! # Threading Model
//!
//! - **Edge thread**: calls [`FrequencyEngine::notify_measured_edge`] and
//!   [`FrequencyEngine::notify_reference_edge`] in hardware arrival order.
//! - **Publishers**: call [`FrequencyEngine::read_estimate`] from any thread.
//!
//! The measured path (debouncer + history) sits behind one short-held mutex
//! so that accept-and-record is atomic with respect to the span query made on
//! reference edges. The reference path (calibrator + estimator) has its own
//! mutex and is always locked before the measured one. The estimate itself
//! lives in a seqlock register, so readers never take either lock. The
//! estimate observer runs with neither lock held.

use crate::calibrator::ReferenceCalibrator;
use crate::debounce::Debouncer;
use crate::estimator::{EstimateSkip, EstimatorInput, FrequencyEstimator};
use crate::history::{EdgeHistory, Span};
use crate::store::{Estimate, EstimateStore};
use gf_common::config::EngineConfig;
use gf_common::edge::EdgeSink;
use gf_common::metrics::{CountersSnapshot, EngineCounters};
use gf_common::time::Tick;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

/// Callback invoked with every newly stored estimate.
pub type EstimateObserver = Box<dyn Fn(&Estimate) + Send + Sync>;

/// Measured-channel state.
#[derive(Debug)]
struct MeasuredPath {
    debouncer: Debouncer,
    history: EdgeHistory,
    /// Accepted edges since the last reference edge.
    since_reference: u64,
}

/// Reference-channel state.
#[derive(Debug)]
struct ReferencePath {
    calibrator: ReferenceCalibrator,
    estimator: FrequencyEstimator,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic elsewhere never leaves these structures half-updated.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`FrequencyEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    observer: Option<EstimateObserver>,
}

impl EngineBuilder {
    /// Start from the default engine configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a callback for each new estimate.
    ///
    /// Runs on the edge thread after the estimate is stored and both paths
    /// are unlocked. It may query the engine but should not block, since
    /// edges are not serviced until it returns.
    #[must_use]
    pub fn on_estimate<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Estimate) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> FrequencyEngine {
        FrequencyEngine {
            measured: Mutex::new(MeasuredPath {
                debouncer: Debouncer::new(self.config.debounce_us),
                history: EdgeHistory::new(self.config.history_capacity),
                since_reference: 0,
            }),
            reference: Mutex::new(ReferencePath {
                calibrator: ReferenceCalibrator::new(),
                estimator: FrequencyEstimator::from_config(&self.config),
            }),
            store: EstimateStore::new(),
            counters: EngineCounters::new(),
            observer: self.observer,
            config: self.config,
        }
    }
}

/// Drift-corrected frequency measurement engine.
pub struct FrequencyEngine {
    config: EngineConfig,
    measured: Mutex<MeasuredPath>,
    reference: Mutex<ReferencePath>,
    store: EstimateStore,
    counters: EngineCounters,
    observer: Option<EstimateObserver>,
}

impl std::fmt::Debug for FrequencyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyEngine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for FrequencyEngine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl FrequencyEngine {
    /// Engine with the given configuration and no observer.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new().config(config).build()
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Offer a measured-channel edge. Returns `true` if it was accepted.
    pub fn notify_measured_edge(&self, tick: Tick) -> bool {
        let accepted = {
            let mut path = lock(&self.measured);
            let accepted = path.debouncer.accept(tick);
            if accepted {
                path.history.record(tick);
                path.since_reference += 1;
            }
            accepted
        };
        self.counters.record_measured(accepted);
        if !accepted {
            trace!(%tick, "Measured edge debounced");
        }
        accepted
    }

    /// Handle a reference-channel edge, computing a new estimate when
    /// possible. Returns the estimate that was stored, if any.
    pub fn notify_reference_edge(&self, tick: Tick) -> Option<Estimate> {
        self.counters.record_reference();
        let mut reference = lock(&self.reference);

        let (span, samples, interval_edges) = self.take_measured_snapshot();

        let result = match reference.calibrator.on_reference_edge(tick) {
            None => Err(EstimateSkip::NoBaseline),
            Some(base_time_s) => reference
                .estimator
                .estimate(EstimatorInput {
                    base_time_s,
                    span,
                    samples,
                    interval_edges,
                })
                .map(|hz| Estimate::now(hz, base_time_s, samples)),
        };

        match result {
            Ok(estimate) => {
                self.store.write(estimate);
                drop(reference);
                self.counters.record_estimate();
                debug!(
                    frequency_hz = estimate.frequency_hz,
                    reference_period_s = estimate.reference_period_s,
                    samples = estimate.samples,
                    "Frequency estimate updated"
                );
                if let Some(observer) = &self.observer {
                    observer(&estimate);
                }
                Some(estimate)
            }
            Err(EstimateSkip::NoBaseline) => {
                debug!(%tick, "Reference baseline established");
                None
            }
            Err(skip) if skip.is_degenerate() => {
                self.counters.record_skip(true);
                warn!(%tick, reason = %skip, "Skipping estimate");
                None
            }
            Err(skip) => {
                self.counters.record_skip(false);
                debug!(%tick, reason = %skip, "No estimate yet");
                None
            }
        }
    }

    /// Span, length, and per-interval edge count, resetting the latter.
    fn take_measured_snapshot(&self) -> (Option<Span>, usize, u64) {
        let mut path = lock(&self.measured);
        let interval_edges = std::mem::take(&mut path.since_reference);
        (path.history.span(), path.history.len(), interval_edges)
    }

    /// Latest estimate, or `None` before the first successful computation.
    #[inline]
    #[must_use]
    pub fn read_estimate(&self) -> Option<Estimate> {
        self.store.read()
    }

    /// The estimate register, for publishers that track its version.
    #[must_use]
    pub fn store(&self) -> &EstimateStore {
        &self.store
    }

    /// Current history span, if at least two samples are held.
    #[must_use]
    pub fn history_span(&self) -> Option<Span> {
        lock(&self.measured).history.span()
    }

    /// Number of measured samples held.
    #[must_use]
    pub fn history_len(&self) -> usize {
        lock(&self.measured).history.len()
    }

    /// Most recent reference interval in seconds.
    #[must_use]
    pub fn reference_period(&self) -> Option<f64> {
        lock(&self.reference).calibrator.base_time_s()
    }

    /// Snapshot of activity counters.
    #[must_use]
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }
}

impl EdgeSink for FrequencyEngine {
    fn notify_measured_edge(&self, tick: Tick) {
        FrequencyEngine::notify_measured_edge(self, tick);
    }

    fn notify_reference_edge(&self, tick: Tick) {
        FrequencyEngine::notify_reference_edge(self, tick);
    }
}
