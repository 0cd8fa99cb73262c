//! Deterministic edge generator.
//!
//! Produces a reference edge every `1 s * (1 + drift_ppm / 1e6)` and
//! measured edges at `signal_hz * edges_per_cycle` per second, optionally
//! followed by a bounce edge 1 ms later. Time is either the wall clock
//! ([`EdgeSource::poll`]) or advanced explicitly with
//! [`SimulatedSource::advance`] for tests.

use crate::EdgeSource;
use gf_common::config::{SimulatedConfig, SourceDriver};
use gf_common::edge::{EdgeEvent, EdgeSink};
use gf_common::time::Tick;
use gf_common::{FreqError, FreqResult};
use std::time::{Duration, Instant};
use tracing::debug;

/// Delay of a simulated contact bounce after the real edge.
const BOUNCE_DELAY_US: f64 = 1_000.0;

/// Simulated edge source.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulatedConfig,
    initialized: bool,
    origin: Tick,
    /// Virtual time in microseconds since `origin`.
    clock_us: f64,
    reference_period_us: f64,
    measured_period_us: f64,
    next_reference_us: f64,
    next_measured_us: f64,
    pending_bounce_us: Option<f64>,
    measured_emitted: u64,
    started: Option<Instant>,
}

impl SimulatedSource {
    /// Create a simulated source.
    pub fn new(config: SimulatedConfig) -> Self {
        let reference_period_us = 1_000_000.0 * (1.0 + config.reference_drift_ppm / 1_000_000.0);
        let measured_period_us = 1_000_000.0 / (config.signal_hz * config.edges_per_cycle);
        Self {
            origin: Tick(config.start_tick),
            config,
            initialized: false,
            clock_us: 0.0,
            reference_period_us,
            measured_period_us,
            next_reference_us: 0.0,
            // Offset by half a period so the two lines never coincide
            next_measured_us: measured_period_us / 2.0,
            pending_bounce_us: None,
            measured_emitted: 0,
            started: None,
        }
    }

    /// Tick corresponding to the current virtual time.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.tick_at(self.clock_us)
    }

    fn tick_at(&self, us: f64) -> Tick {
        // Truncation to u32 is the counter wrap
        self.origin.wrapping_add_micros((us.round() as u64) as u32)
    }

    /// Advance virtual time by `micros` and deliver every edge that falls due.
    pub fn advance(&mut self, micros: u64, sink: &dyn EdgeSink) -> usize {
        self.clock_us += micros as f64;
        self.emit_until(self.clock_us, sink)
    }

    fn next_event(&self) -> (f64, EdgeKind) {
        let mut next = (self.next_measured_us, EdgeKind::Measured);
        if self.next_reference_us < next.0 {
            next = (self.next_reference_us, EdgeKind::Reference);
        }
        if let Some(bounce) = self.pending_bounce_us {
            if bounce < next.0 {
                next = (bounce, EdgeKind::Bounce);
            }
        }
        next
    }

    fn emit_until(&mut self, until_us: f64, sink: &dyn EdgeSink) -> usize {
        let mut delivered = 0;
        loop {
            let (at, kind) = self.next_event();
            if at > until_us {
                return delivered;
            }
            let tick = self.tick_at(at);
            match kind {
                EdgeKind::Reference => {
                    sink.deliver(EdgeEvent::reference(tick));
                    self.next_reference_us += self.reference_period_us;
                }
                EdgeKind::Measured => {
                    sink.deliver(EdgeEvent::measured(tick));
                    self.measured_emitted += 1;
                    self.next_measured_us += self.measured_period_us;
                    let every = u64::from(self.config.bounce_every);
                    if every > 0 && self.measured_emitted % every == 0 {
                        self.pending_bounce_us = Some(at + BOUNCE_DELAY_US);
                    }
                }
                EdgeKind::Bounce => {
                    sink.deliver(EdgeEvent::measured(tick));
                    self.pending_bounce_us = None;
                }
            }
            delivered += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Reference,
    Measured,
    Bounce,
}

impl EdgeSource for SimulatedSource {
    fn init(&mut self) -> FreqResult<()> {
        self.initialized = true;
        self.started = Some(Instant::now());
        debug!(origin = %self.origin, "Simulated source started");
        Ok(())
    }

    fn poll(&mut self, sink: &dyn EdgeSink, timeout: Duration) -> FreqResult<usize> {
        if !self.initialized {
            return Err(FreqError::SourceUnavailable(
                "simulated source not initialized".into(),
            ));
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        let (next_at, _) = self.next_event();
        let now_us = started.elapsed().as_micros() as f64;
        if next_at > now_us {
            let wait = Duration::from_micros((next_at - now_us) as u64).min(timeout);
            std::thread::sleep(wait);
        }

        self.clock_us = started.elapsed().as_micros() as f64;
        Ok(self.emit_until(self.clock_us, sink))
    }

    fn shutdown(&mut self) -> FreqResult<()> {
        self.initialized = false;
        Ok(())
    }

    fn is_operational(&self) -> bool {
        self.initialized
    }

    fn kind(&self) -> SourceDriver {
        SourceDriver::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gf_common::edge::Channel;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<EdgeEvent>>,
    }

    impl EdgeSink for Recorder {
        fn notify_measured_edge(&self, tick: Tick) {
            self.events.lock().unwrap().push(EdgeEvent::measured(tick));
        }

        fn notify_reference_edge(&self, tick: Tick) {
            self.events.lock().unwrap().push(EdgeEvent::reference(tick));
        }
    }

    impl Recorder {
        fn count(&self, channel: Channel) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.channel == channel)
                .count()
        }
    }

    #[test]
    fn test_one_second_of_fifty_hz() {
        let mut source = SimulatedSource::new(SimulatedConfig::default());
        let sink = Recorder::default();
        // Reference edge at t=0 is due immediately
        source.advance(999_999, &sink);
        assert_eq!(sink.count(Channel::Reference), 1);
        assert_eq!(sink.count(Channel::Measured), 100);

        source.advance(1, &sink);
        assert_eq!(sink.count(Channel::Reference), 2);
    }

    #[test]
    fn test_events_in_time_order() {
        let config = SimulatedConfig {
            bounce_every: 3,
            start_tick: u32::MAX - 500_000,
            ..SimulatedConfig::default()
        };
        let mut source = SimulatedSource::new(config);
        let sink = Recorder::default();
        source.advance(3_000_000, &sink);

        let events = sink.events.lock().unwrap();
        for pair in events.windows(2) {
            assert!(pair[1].tick.is_at_or_after(pair[0].tick));
        }
    }

    #[test]
    fn test_bounce_edges_follow_every_nth() {
        let config = SimulatedConfig {
            bounce_every: 10,
            ..SimulatedConfig::default()
        };
        let mut source = SimulatedSource::new(config);
        let sink = Recorder::default();
        source.advance(999_999, &sink);
        assert_eq!(sink.count(Channel::Measured), 110);
    }

    #[test]
    fn test_drift_stretches_reference_period() {
        let config = SimulatedConfig {
            reference_drift_ppm: 20_000.0,
            ..SimulatedConfig::default()
        };
        let mut source = SimulatedSource::new(config);
        let sink = Recorder::default();
        source.advance(1_019_999, &sink);
        assert_eq!(sink.count(Channel::Reference), 1);
        source.advance(1, &sink);
        assert_eq!(sink.count(Channel::Reference), 2);
    }

    #[test]
    fn test_poll_requires_init() {
        let mut source = SimulatedSource::new(SimulatedConfig::default());
        let sink = Recorder::default();
        assert!(source.poll(&sink, Duration::from_millis(1)).is_err());

        source.init().unwrap();
        assert!(source.is_operational());
        // The t=0 reference edge is due at once
        let n = source.poll(&sink, Duration::from_millis(1)).unwrap();
        assert!(n >= 1);
        source.shutdown().unwrap();
        assert!(!source.is_operational());
    }
}
