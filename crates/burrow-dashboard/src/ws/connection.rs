use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::gateway::{self, PumpExit};

/// Axum handler: upgrades HTTP to WebSocket at GET /_ws.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| run_connection(socket, state))
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed websocket upgrade");
            (StatusCode::BAD_REQUEST, "Failed websocket upgrade").into_response()
        }
    }
}

/// Per-connection task. Lives until the browser leaves or the hub closes.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let subscription = state.hub.register();
    let id = subscription.id();
    info!(subscriber = %id, "dashboard stream opened");

    let (mut tx, mut rx) = socket.split();

    // Inbound frames are ignored; the read side only tells us when the
    // browser is gone.
    let peer_closed = async move {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    let write_timeout = state.config.dashboard.write_timeout();
    let exit = gateway::pump(subscription, &mut tx, write_timeout, peer_closed).await;

    if exit == PumpExit::HubClosed {
        let _ = tx.close().await;
    }
    info!(subscriber = %id, reason = ?exit, "dashboard stream closed");
}
