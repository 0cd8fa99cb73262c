//! Edge-event sources.
//!
//! This crate provides:
//! - [`EdgeSource`] trait for anything that timestamps edges on the two inputs
//! - [`pigpio`] module with a client for the pigpio daemon socket interface
//! - [`simulated`] module with a deterministic edge generator
//! - [`realtime`] module with scheduling setup for the edge thread
//! - [`SourceGuard`] for guaranteed release of the source on every exit path

pub mod pigpio;
pub mod realtime;
pub mod simulated;

pub use pigpio::*;
pub use simulated::*;

use gf_common::config::{SourceConfig, SourceDriver};
use gf_common::edge::EdgeSink;
use gf_common::FreqResult;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{info, warn};

/// Edge source abstraction.
///
/// A source is initialized once, then polled repeatedly from a dedicated
/// thread; every poll forwards the edges that arrived to the sink in
/// hardware arrival order.
pub trait EdgeSource: Send {
    /// Open the underlying device or connection and configure the inputs.
    fn init(&mut self) -> FreqResult<()>;

    /// Wait up to `timeout` for edges and deliver them to `sink`.
    ///
    /// Returns the number of edges delivered. An error means the source is
    /// gone and will not recover.
    fn poll(&mut self, sink: &dyn EdgeSink, timeout: Duration) -> FreqResult<usize>;

    /// Release the device or connection.
    fn shutdown(&mut self) -> FreqResult<()>;

    /// Check if the source is delivering edges.
    fn is_operational(&self) -> bool;

    /// Source driver type.
    fn kind(&self) -> SourceDriver;
}

/// Create the source selected by configuration.
pub fn create_source(config: &SourceConfig) -> Box<dyn EdgeSource> {
    match config.driver {
        SourceDriver::Pigpio => {
            info!(address = %config.pigpio.address, "Using pigpio edge source");
            Box::new(PigpioSource::new(config.pigpio.clone()))
        }
        SourceDriver::Simulated => {
            info!(
                signal_hz = config.simulated.signal_hz,
                drift_ppm = config.simulated.reference_drift_ppm,
                "Using simulated edge source"
            );
            Box::new(SimulatedSource::new(config.simulated.clone()))
        }
    }
}

/// Owns an initialized source and shuts it down when dropped.
pub struct SourceGuard {
    source: Box<dyn EdgeSource>,
}

impl SourceGuard {
    /// Initialize `source` and take ownership of it.
    ///
    /// # Errors
    ///
    /// Returns the initialization error; a partially opened source is shut
    /// down before returning.
    pub fn init(mut source: Box<dyn EdgeSource>) -> FreqResult<Self> {
        if let Err(e) = source.init() {
            if let Err(shutdown_err) = source.shutdown() {
                warn!(error = %shutdown_err, "Cleanup after failed init also failed");
            }
            return Err(e);
        }
        Ok(Self { source })
    }
}

impl Deref for SourceGuard {
    type Target = dyn EdgeSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl DerefMut for SourceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.source.as_mut()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        let kind = self.source.kind();
        match self.source.shutdown() {
            Ok(()) => info!(?kind, "Edge source released"),
            Err(e) => warn!(?kind, error = %e, "Edge source shutdown failed"),
        }
    }
}
