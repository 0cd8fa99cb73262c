//! HTTP and WebSocket publishing of frequency estimates.
//!
//! This crate provides:
//! - HTTP REST API for the latest estimate, counters, and health
//! - WebSocket endpoints for periodic and per-estimate streaming
//! - Prometheus metrics and an embedded dashboard
//!
//! # Usage
//!
//! ```ignore
//! use gf_web::{EstimatePublisher, WebServer};
//!
//! let publisher = EstimatePublisher::new(config.publish.channel_capacity);
//! let engine = EngineBuilder::new()
//!     .config(config.engine.clone())
//!     .on_estimate(publisher.observer())
//!     .build();
//!
//! let server = WebServer::new(config.publish.clone(), Arc::new(engine), publisher)?;
//! let status = server.status_handle();
//! server.start(shutdown_signal).await?;
//! ```

mod api;
mod dashboard;
mod metrics;
mod state;
mod websocket;

pub use api::*;
pub use dashboard::*;
pub use metrics::*;
pub use state::*;
pub use websocket::*;

use anyhow::Context;
use axum::{
    routing::{get, Router},
    Extension,
};
use gf_common::config::PublishConfig;
use gf_engine::FrequencyEngine;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// HTTP/WebSocket server publishing the engine's estimates.
pub struct WebServer {
    config: PublishConfig,
    state: Arc<SharedState>,
    metrics: Arc<MonitorMetrics>,
}

impl WebServer {
    /// Create a server for `engine`.
    ///
    /// `publisher` must be the one whose observer was installed on the
    /// engine, otherwise `/ws/live` never receives anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the Prometheus collectors cannot be registered.
    pub fn new(
        config: PublishConfig,
        engine: Arc<FrequencyEngine>,
        publisher: EstimatePublisher,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(SharedState::new(
            engine,
            publisher,
            config.precision,
            config.interval,
        ));
        let metrics = Arc::new(MonitorMetrics::new().context("creating Prometheus metrics")?);
        Ok(Self {
            config,
            state,
            metrics,
        })
    }

    /// Handle for reporting lifecycle state changes.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_addr;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("binding web server to {bind_addr}"))?;
        info!(addr = %bind_addr, "Web server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("web server failed")?;

        info!("Web server stopped");
        Ok(())
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route("/", get(dashboard::dashboard_handler))
            .route("/dashboard", get(dashboard::dashboard_handler))
            .route("/health", get(api::health_check))
            .route("/api/estimate", get(api::get_estimate))
            .route("/api/counters", get(api::get_counters))
            .route("/metrics", get(metrics::metrics_handler))
            .route("/ws", get(websocket::ws_handler))
            .route("/ws/live", get(websocket::ws_live_handler))
            .layer(Extension(Arc::clone(&self.state)))
            .layer(Extension(Arc::clone(&self.metrics)));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app
    }
}
