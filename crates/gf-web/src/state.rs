//! Shared state for the HTTP and WebSocket handlers.

use crate::MonitorMetrics;
use gf_common::state::MonitorState;
use gf_engine::{unix_seconds, Estimate, FrequencyEngine};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

/// Message published to clients.
///
/// All times are fractional seconds since the Unix epoch. `frequency` and
/// `last_update_time` are `null` until the first estimate exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPayload {
    /// Time the payload was built.
    pub timestamp: f64,
    /// Time the latest estimate was computed.
    pub last_update_time: Option<f64>,
    /// Latest estimate in Hz, rounded for publishing.
    pub frequency: Option<f64>,
}

impl FrequencyPayload {
    /// Build a payload stamped with `now`.
    #[must_use]
    pub fn new(estimate: Option<Estimate>, precision: u32, now: SystemTime) -> Self {
        Self {
            timestamp: unix_seconds(now),
            last_update_time: estimate.map(|e| e.computed_at_unix()),
            frequency: estimate.map(|e| e.rounded(precision)),
        }
    }
}

/// Fan-out of freshly computed estimates to live subscribers.
#[derive(Debug, Clone)]
pub struct EstimatePublisher {
    tx: broadcast::Sender<Estimate>,
}

impl EstimatePublisher {
    /// Publisher buffering up to `capacity` estimates per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Engine observer that forwards every estimate.
    ///
    /// Never blocks; with no subscribers the estimate is dropped.
    pub fn observer(&self) -> impl Fn(&Estimate) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |estimate| {
            let _ = tx.send(*estimate);
        }
    }

    /// Subscribe to estimates published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Estimate> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// State shared by all handlers.
pub struct SharedState {
    engine: Arc<FrequencyEngine>,
    publisher: EstimatePublisher,
    monitor_state: AtomicU8,
    precision: u32,
    interval: Duration,
}

impl SharedState {
    /// State in [`MonitorState::Boot`], publishing rounded to `precision`.
    pub fn new(
        engine: Arc<FrequencyEngine>,
        publisher: EstimatePublisher,
        precision: u32,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            publisher,
            monitor_state: AtomicU8::new(MonitorState::Boot.as_u8()),
            precision,
            interval,
        }
    }

    /// The engine estimates are read from.
    pub fn engine(&self) -> &FrequencyEngine {
        &self.engine
    }

    /// Fan-out that live WebSocket clients subscribe to.
    pub fn publisher(&self) -> &EstimatePublisher {
        &self.publisher
    }

    /// Payload for the latest estimate, stamped now.
    pub fn payload(&self) -> FrequencyPayload {
        self.payload_for(self.engine.read_estimate())
    }

    /// Payload for a specific estimate, stamped now.
    pub fn payload_for(&self, estimate: Option<Estimate>) -> FrequencyPayload {
        FrequencyPayload::new(estimate, self.precision, SystemTime::now())
    }

    /// Lifecycle state last reported by the daemon.
    pub fn monitor_state(&self) -> MonitorState {
        MonitorState::from_u8(self.monitor_state.load(Ordering::Acquire))
    }

    /// Periodic push cadence.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Handle for reporting lifecycle changes from the daemon.
#[derive(Clone)]
pub struct StatusHandle {
    pub(crate) state: Arc<SharedState>,
    pub(crate) metrics: Arc<MonitorMetrics>,
}

impl StatusHandle {
    /// Record the monitor lifecycle state.
    pub fn set_monitor_state(&self, state: MonitorState) {
        self.state
            .monitor_state
            .store(state.as_u8(), Ordering::Release);
        self.metrics.monitor_state.set(i64::from(state.as_u8()));
    }
}
