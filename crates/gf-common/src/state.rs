//! Monitor lifecycle state machine.
//!
//! BOOT → CONNECTING → RUNNING → STOPPED, with FAULT reachable from any
//! startup or operational state when the edge source is lost.

use crate::error::{FreqError, FreqResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of the monitor process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    /// Process started, configuration being loaded.
    #[default]
    Boot,
    /// Edge source is being opened and configured.
    Connecting,
    /// Edges are flowing into the engine.
    Running,
    /// The edge source failed; no further estimates will be produced.
    Fault,
    /// Orderly shutdown completed.
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot => write!(f, "BOOT"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Fault => write!(f, "FAULT"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl MonitorState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: MonitorState) -> bool {
        use MonitorState::{Boot, Connecting, Fault, Running, Stopped};

        matches!(
            (self, target),
            (Boot, Connecting)
                | (Connecting, Running)
                | (Boot, Fault)
                | (Connecting, Fault)
                | (Running, Fault)
                | (Boot, Stopped)
                | (Connecting, Stopped)
                | (Running, Stopped)
                | (Fault, Stopped)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: MonitorState) -> FreqResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(FreqError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true while edges are expected to arrive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true once the monitor can no longer produce estimates.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fault | Self::Stopped)
    }

    /// Numeric encoding used for gauges and atomic storage.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Boot => 0,
            Self::Connecting => 1,
            Self::Running => 2,
            Self::Fault => 3,
            Self::Stopped => 4,
        }
    }

    /// Inverse of [`MonitorState::as_u8`]; unknown values map to `Fault`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Boot,
            1 => Self::Connecting,
            2 => Self::Running,
            4 => Self::Stopped,
            _ => Self::Fault,
        }
    }
}
