//! Edge events and the inbound notification interface.
//!
//! Sources (GPIO backends, simulators, replay tools) deliver timestamped
//! falling edges to an [`EdgeSink`]; the frequency engine is the sink.

use crate::time::Tick;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input line an edge was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The 1 Hz calibration input.
    Reference,
    /// The signal whose frequency is estimated.
    Measured,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Reference => write!(f, "reference"),
            Channel::Measured => write!(f, "measured"),
        }
    }
}

/// A single timestamped edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    /// Line the edge occurred on.
    pub channel: Channel,
    /// Tick at which the edge was detected.
    pub tick: Tick,
}

impl EdgeEvent {
    /// Edge on the reference line.
    #[must_use]
    pub const fn reference(tick: Tick) -> Self {
        Self {
            channel: Channel::Reference,
            tick,
        }
    }

    /// Edge on the measured line.
    #[must_use]
    pub const fn measured(tick: Tick) -> Self {
        Self {
            channel: Channel::Measured,
            tick,
        }
    }
}

/// Receiver of edge notifications.
///
/// Implementations are called from the edge thread and must return in
/// bounded time without blocking on I/O.
pub trait EdgeSink: Send + Sync {
    /// A significant edge was seen on the measured line.
    fn notify_measured_edge(&self, tick: Tick);

    /// An edge was seen on the reference line.
    fn notify_reference_edge(&self, tick: Tick);

    /// Dispatch an event to the matching notification.
    fn deliver(&self, event: EdgeEvent) {
        match event.channel {
            Channel::Measured => self.notify_measured_edge(event.tick),
            Channel::Reference => self.notify_reference_edge(event.tick),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_deliver_dispatches_by_channel() {
        let sink = Recorder::default();
        sink.deliver(EdgeEvent::reference(Tick(1)));
        sink.deliver(EdgeEvent::measured(Tick(2)));

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].channel, Channel::Reference);
        assert_eq!(events[1].channel, Channel::Measured);
        assert_eq!(events[1].tick, Tick(2));
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Reference.to_string(), "reference");
        assert_eq!(Channel::Measured.to_string(), "measured");
    }
}
