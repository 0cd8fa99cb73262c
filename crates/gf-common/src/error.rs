use thiserror::Error;

/// Error types covering configuration, edge sources, and lifecycle faults.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FreqError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The edge-event source is unreachable or stopped delivering events.
    #[error("edge source unavailable: {0}")]
    SourceUnavailable(String),

    /// The edge source answered a command with an error code.
    #[error("source protocol error: command {command} returned {code}")]
    Protocol {
        /// Command identifier that failed.
        command: u32,
        /// Negative status code reported by the source.
        code: i32,
    },

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl From<std::io::Error> for FreqError {
    fn from(err: std::io::Error) -> Self {
        FreqError::Io(err.to_string())
    }
}

/// Convenience type alias for fallible monitor operations.
pub type FreqResult<T> = Result<T, FreqError>;
