//! WebSocket streaming of frequency payloads.
//!
//! Two flavours:
//! - `/ws` pushes the latest payload every publish interval, whether or not
//!   a new estimate exists.
//! - `/ws/live` pushes once per computed estimate.
//!
//! Each connection runs in its own tasks; a slow or broken client never
//! affects the engine or other clients.

use crate::metrics::MonitorMetrics;
use crate::state::{FrequencyPayload, SharedState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type Sender = SplitSink<WebSocket, Message>;

/// Periodic push upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<SharedState>>,
    Extension(metrics): Extension<Arc<MonitorMetrics>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, metrics, Mode::Periodic))
}

/// Per-estimate push upgrade handler.
///
/// GET /ws/live
pub async fn ws_live_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<SharedState>>,
    Extension(metrics): Extension<Arc<MonitorMetrics>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, metrics, Mode::Live))
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Periodic,
    Live,
}

async fn send_payload(sender: &mut Sender, payload: &FrequencyPayload) -> bool {
    match serde_json::to_string(payload) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize payload");
            true
        }
    }
}

async fn push_periodic(mut sender: Sender, state: Arc<SharedState>) {
    let mut ticker = tokio::time::interval(state.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !send_payload(&mut sender, &state.payload()).await {
            break;
        }
    }
}

async fn push_live(mut sender: Sender, state: Arc<SharedState>) {
    let mut rx = state.publisher().subscribe();

    // Current value first so the client is not blank until the next edge
    if !send_payload(&mut sender, &state.payload()).await {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(estimate) => {
                if !send_payload(&mut sender, &state.payload_for(Some(estimate))).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(dropped = n, "WebSocket client lagged, dropped estimates");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Handle an individual WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<SharedState>,
    metrics: Arc<MonitorMetrics>,
    mode: Mode,
) {
    info!(?mode, "WebSocket client connected");
    metrics.websocket_clients.inc();

    let (sender, mut receiver) = socket.split();

    let send_task = match mode {
        Mode::Periodic => tokio::spawn(push_periodic(sender, Arc::clone(&state))),
        Mode::Live => tokio::spawn(push_live(sender, Arc::clone(&state))),
    };

    // Clients have nothing to say; drain until they close
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client sent close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let send_abort = send_task.abort_handle();
    let recv_abort = recv_task.abort_handle();
    tokio::select! {
        _ = send_task => {
            debug!("WebSocket send task ended");
            recv_abort.abort();
        }
        _ = recv_task => {
            debug!("WebSocket receive task ended");
            send_abort.abort();
        }
    }

    metrics.websocket_clients.dec();
    info!(?mode, "WebSocket client disconnected");
}
