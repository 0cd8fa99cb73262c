//! grid-freq daemon entry point.
//!
//! Wires an edge source into the frequency engine and publishes estimates
//! over HTTP/WebSocket, with signal handling and guaranteed release of the
//! GPIO source on every exit path.

mod signals;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use gf_common::config::{MonitorConfig, RealtimeConfig, SourceConfig, SourceDriver};
use gf_common::state::MonitorState;
use gf_common::FreqResult;
use gf_engine::{EngineBuilder, FrequencyEngine};
use gf_source::realtime::init_realtime;
use gf_source::{create_source, SourceGuard};
use gf_web::{EstimatePublisher, StatusHandle, WebServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// How long one source poll may block before the stop flag is rechecked.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// grid-freq command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "grid-freq",
    about = "Mains frequency monitor - drift-corrected estimates from GPIO edge timing",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulated edge source instead of pigpio.
    #[arg(long, short = 's')]
    simulated: bool,

    /// Address for the HTTP/WebSocket server (overrides config file).
    #[arg(long, short = 'b', value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Debounce threshold in microseconds (overrides config file).
    #[arg(long, value_name = "MICROS")]
    debounce_us: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

/// Messages from the edge-source thread.
#[derive(Debug)]
enum SourceEvent {
    /// Source initialized; edges are flowing.
    Running,
    /// The poll loop ended.
    Finished(FreqResult<()>),
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    if args.print_config {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting grid-freq");
    info!(
        driver = ?config.source.driver,
        algorithm = ?config.engine.algorithm,
        debounce_us = config.engine.debounce_us,
        bind = %config.publish.bind_addr,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run_daemon(config, &signal_handler)
}

/// Initialize logging with the specified log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_logging(level: &str) {
    let filter = format!(
        "grid_freq={level},gf_daemon={level},gf_engine={level},gf_source={level},gf_web={level},gf_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_names(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `GRID_FREQ_CONFIG` environment variable
/// 3. `/etc/grid-freq/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<MonitorConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return MonitorConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("GRID_FREQ_CONFIG") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from GRID_FREQ_CONFIG");
            return MonitorConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from GRID_FREQ_CONFIG={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "GRID_FREQ_CONFIG set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/grid-freq/config.toml", "config/default.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config");
            return MonitorConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(MonitorConfig::default())
}

/// Command-line flags win over the file.
fn apply_overrides(config: &mut MonitorConfig, args: &Args) {
    if args.simulated {
        config.source.driver = SourceDriver::Simulated;
    }
    if let Some(bind) = args.bind {
        config.publish.bind_addr = bind;
    }
    if let Some(debounce_us) = args.debounce_us {
        config.engine.debounce_us = debounce_us;
    }
}

/// Record a lifecycle transition locally and on the web status.
fn transition(state: &mut MonitorState, target: MonitorState, status: &StatusHandle) {
    if let Err(e) = state.transition_to(target) {
        warn!(error = %e, "Ignoring lifecycle transition");
        return;
    }
    status.set_monitor_state(target);
    info!(state = %target, "Monitor state changed");
}

/// Run the daemon until a signal arrives or the edge source fails.
fn run_daemon(config: MonitorConfig, signal_handler: &SignalHandler) -> Result<()> {
    let mut state = MonitorState::Boot;

    let publisher = EstimatePublisher::new(config.publish.channel_capacity);
    let engine = Arc::new(
        EngineBuilder::new()
            .config(config.engine.clone())
            .on_estimate(publisher.observer())
            .build(),
    );

    let server = WebServer::new(config.publish.clone(), Arc::clone(&engine), publisher)?;
    let status = server.status_handle();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("web")
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let (stop_web_tx, stop_web_rx) = tokio::sync::oneshot::channel::<()>();
    let web_task = runtime.spawn(server.start(async move {
        let _ = stop_web_rx.await;
    }));

    transition(&mut state, MonitorState::Connecting, &status);

    let stop = Arc::new(AtomicBool::new(false));
    let (events_tx, events_rx) = mpsc::channel();
    let edge_thread = {
        let source_config = config.source.clone();
        let realtime = config.realtime.clone();
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("edge-source".into())
            .spawn(move || {
                let result = run_edge_source(&source_config, &realtime, &engine, &stop, &events_tx);
                let _ = events_tx.send(SourceEvent::Finished(result));
            })
            .context("Failed to spawn edge-source thread")?
    };

    let mut failure = None;
    let mut last_status_log = Instant::now();
    loop {
        if signal_handler.shutdown_requested() {
            info!("Shutdown requested");
            break;
        }

        match events_rx.recv_timeout(POLL_TIMEOUT) {
            Ok(SourceEvent::Running) => {
                transition(&mut state, MonitorState::Running, &status);
            }
            Ok(SourceEvent::Finished(Ok(()))) => {
                info!("Edge source stopped");
                break;
            }
            Ok(SourceEvent::Finished(Err(e))) => {
                error!(error = %e, "Edge source failed");
                transition(&mut state, MonitorState::Fault, &status);
                failure = Some(anyhow!(e).context("Edge source failed"));
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                transition(&mut state, MonitorState::Fault, &status);
                failure = Some(anyhow!("edge-source thread exited unexpectedly"));
                break;
            }
        }

        if web_task.is_finished() {
            error!("Web server exited unexpectedly");
            break;
        }

        if last_status_log.elapsed() >= STATUS_LOG_INTERVAL {
            log_status(&engine);
            last_status_log = Instant::now();
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    stop.store(true, Ordering::Release);
    if edge_thread.join().is_err() {
        error!("edge-source thread panicked");
    }

    let _ = stop_web_tx.send(());
    match runtime.block_on(web_task) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Web server failed");
            failure.get_or_insert(e);
        }
        Err(e) => error!(error = %e, "Web server task panicked"),
    }
    runtime.shutdown_timeout(Duration::from_secs(1));

    transition(&mut state, MonitorState::Stopped, &status);
    log_status(&engine);
    info!(
        signals = signal_handler.state().signal_count(),
        "grid-freq shutdown complete"
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Body of the edge-source thread.
///
/// The source is owned by a [`SourceGuard`], so it is released however this
/// function returns.
fn run_edge_source(
    source_config: &SourceConfig,
    realtime: &RealtimeConfig,
    engine: &FrequencyEngine,
    stop: &AtomicBool,
    events: &mpsc::Sender<SourceEvent>,
) -> FreqResult<()> {
    init_realtime(realtime)?;

    let mut source = SourceGuard::init(create_source(source_config))?;
    let _ = events.send(SourceEvent::Running);

    while !stop.load(Ordering::Acquire) {
        source.poll(engine, POLL_TIMEOUT)?;
    }
    Ok(())
}

fn log_status(engine: &FrequencyEngine) {
    let counters = engine.counters();
    let estimate = engine.read_estimate();
    info!(
        frequency_hz = estimate.map(|e| e.frequency_hz),
        reference_period_s = engine.reference_period(),
        measured_accepted = counters.measured_accepted,
        measured_rejected = counters.measured_rejected,
        reference_edges = counters.reference_edges,
        estimates = counters.estimates,
        "Periodic status"
    );
}
