//! Prometheus metrics for frequency monitoring.
//!
//! Exposes the latest estimate and the engine counters in Prometheus text
//! format at `/metrics`.

use crate::state::SharedState;
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
};
use gf_common::metrics::CountersSnapshot;
use gf_engine::{unix_seconds, Estimate};
use prometheus::{Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Prometheus registry and collectors.
pub struct MonitorMetrics {
    registry: Registry,

    /// Latest drift-corrected frequency in Hz.
    pub frequency_hz: Gauge,

    /// Reference interval used for the latest estimate.
    pub reference_period_seconds: Gauge,

    /// Seconds since the latest estimate was computed.
    pub estimate_age_seconds: Gauge,

    /// Current lifecycle state (0=Boot, 1=Connecting, 2=Running, 3=Fault, 4=Stopped).
    pub monitor_state: IntGauge,

    /// Connected WebSocket clients.
    pub websocket_clients: IntGauge,

    /// Measured edges by outcome (`accepted`, `debounced`).
    pub measured_edges_total: IntCounterVec,

    /// Reference edges received.
    pub reference_edges_total: IntCounter,

    /// Estimates written to the store.
    pub estimates_total: IntCounter,

    /// Skipped estimate computations by reason.
    pub estimates_skipped_total: IntCounterVec,

    /// Counters as last mirrored, for delta synchronization.
    last_counters: Mutex<CountersSnapshot>,
}

impl MonitorMetrics {
    /// Create the collectors on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be created or registered.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let frequency_hz = Gauge::new(
            "gridfreq_frequency_hertz",
            "Latest drift-corrected frequency estimate in Hz",
        )?;
        let reference_period_seconds = Gauge::new(
            "gridfreq_reference_period_seconds",
            "Measured interval between reference edges used for the latest estimate",
        )?;
        let estimate_age_seconds = Gauge::new(
            "gridfreq_estimate_age_seconds",
            "Seconds since the latest estimate was computed",
        )?;
        let monitor_state = IntGauge::new(
            "gridfreq_monitor_state",
            "Monitor state (0=Boot, 1=Connecting, 2=Running, 3=Fault, 4=Stopped)",
        )?;
        let websocket_clients = IntGauge::new(
            "gridfreq_websocket_clients",
            "Number of connected WebSocket clients",
        )?;
        let measured_edges_total = IntCounterVec::new(
            Opts::new(
                "gridfreq_measured_edges_total",
                "Measured-signal edges by debounce outcome",
            ),
            &["outcome"],
        )?;
        let reference_edges_total = IntCounter::new(
            "gridfreq_reference_edges_total",
            "Reference (1 Hz) edges received",
        )?;
        let estimates_total =
            IntCounter::new("gridfreq_estimates_total", "Frequency estimates produced")?;
        let estimates_skipped_total = IntCounterVec::new(
            Opts::new(
                "gridfreq_estimates_skipped_total",
                "Reference edges that produced no estimate, by reason",
            ),
            &["reason"],
        )?;

        registry.register(Box::new(frequency_hz.clone()))?;
        registry.register(Box::new(reference_period_seconds.clone()))?;
        registry.register(Box::new(estimate_age_seconds.clone()))?;
        registry.register(Box::new(monitor_state.clone()))?;
        registry.register(Box::new(websocket_clients.clone()))?;
        registry.register(Box::new(measured_edges_total.clone()))?;
        registry.register(Box::new(reference_edges_total.clone()))?;
        registry.register(Box::new(estimates_total.clone()))?;
        registry.register(Box::new(estimates_skipped_total.clone()))?;

        Ok(Self {
            registry,
            frequency_hz,
            reference_period_seconds,
            estimate_age_seconds,
            monitor_state,
            websocket_clients,
            measured_edges_total,
            reference_edges_total,
            estimates_total,
            estimates_skipped_total,
            last_counters: Mutex::new(CountersSnapshot::default()),
        })
    }

    /// Update the estimate gauges.
    pub fn update_from_estimate(&self, estimate: &Estimate, now: SystemTime) {
        self.frequency_hz.set(estimate.frequency_hz);
        self.reference_period_seconds
            .set(estimate.reference_period_s);
        let age = unix_seconds(now) - estimate.computed_at_unix();
        self.estimate_age_seconds.set(age.max(0.0));
    }

    /// Mirror engine counters into the Prometheus counters.
    ///
    /// Engine counters only grow, so the difference to the last mirrored
    /// snapshot is added.
    pub fn update_from_counters(&self, counters: &CountersSnapshot) {
        let mut last = self
            .last_counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let delta = |new: u64, old: u64| new.saturating_sub(old);
        self.measured_edges_total
            .with_label_values(&["accepted"])
            .inc_by(delta(counters.measured_accepted, last.measured_accepted));
        self.measured_edges_total
            .with_label_values(&["debounced"])
            .inc_by(delta(counters.measured_rejected, last.measured_rejected));
        self.reference_edges_total
            .inc_by(delta(counters.reference_edges, last.reference_edges));
        self.estimates_total
            .inc_by(delta(counters.estimates, last.estimates));
        self.estimates_skipped_total
            .with_label_values(&["insufficient"])
            .inc_by(delta(
                counters.skipped_insufficient,
                last.skipped_insufficient,
            ));
        self.estimates_skipped_total
            .with_label_values(&["degenerate"])
            .inc_by(delta(counters.skipped_degenerate, last.skipped_degenerate));

        *last = *counters;
    }

    /// Pull the latest engine values into the collectors.
    pub fn refresh(&self, state: &SharedState) {
        if let Some(estimate) = state.engine().read_estimate() {
            self.update_from_estimate(&estimate, SystemTime::now());
        }
        self.update_from_counters(&state.engine().counters());
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}

/// Metrics endpoint handler.
///
/// GET /metrics
pub async fn metrics_handler(
    Extension(state): Extension<Arc<SharedState>>,
    Extension(metrics): Extension<Arc<MonitorMetrics>>,
) -> impl IntoResponse {
    metrics.refresh(&state);
    match metrics.render() {
        Ok(output) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {e}"),
        )
            .into_response(),
    }
}
