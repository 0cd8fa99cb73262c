//! Signal handling for graceful shutdown.
//!
//! SIGTERM and SIGINT set an async-signal-safe static flag; a small watcher
//! thread copies it into the shared [`SignalState`] the main loop polls.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Written only from the signal handlers.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

const WATCH_INTERVAL: Duration = Duration::from_millis(20);

/// Shared shutdown state.
#[derive(Debug, Default)]
pub struct SignalState {
    shutdown_requested: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// State with no shutdown requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    fn record_signal(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        self.request_shutdown();
    }

    /// Number of termination signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Installs the handlers and exposes the shutdown flag.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Register SIGTERM and SIGINT handlers.
    ///
    /// On non-Unix platforms only [`request_shutdown`](Self::request_shutdown)
    /// ends the daemon.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
        };

        #[cfg(unix)]
        handler.register_unix_handlers()?;

        Ok(handler)
    }

    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        extern "C" fn on_terminate(_: c_int) {
            SIGNALLED.store(true, Ordering::Relaxed);
        }

        let state = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("signal-watch".into())
            .spawn(move || loop {
                if SIGNALLED.swap(false, Ordering::Relaxed) {
                    info!("Termination signal received");
                    state.record_signal();
                }
                if state.shutdown_requested() {
                    break;
                }
                std::thread::sleep(WATCH_INTERVAL);
            })?;

        for signal in [libc::SIGTERM, libc::SIGINT] {
            // SAFETY: the handler only touches an atomic
            let previous = unsafe { libc::signal(signal, on_terminate as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(std::io::Error::last_os_error());
            }
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        self.state.request_shutdown();
    }

    /// Shared shutdown state.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
