//! Orchestrated dashboard shutdown, triggered by `GET /rest/exit` or Ctrl-C.
//!
//! Closing the hub ends every streaming connection through its normal
//! unregister path; cancelling the token stops the heartbeat and lets axum
//! finish in-flight requests before `serve` returns.

use std::sync::Arc;

use tracing::info;

use crate::app::AppState;

/// Begin shutdown. Safe to call more than once; only the first call acts.
/// Returns whether this call initiated the shutdown.
pub fn request_shutdown(app: &AppState, reason: &str) -> bool {
    if app.shutdown.is_cancelled() {
        return false;
    }
    let streams = app.hub.subscriber_count();
    app.hub.close();
    app.shutdown.cancel();
    info!(reason, streams, "dashboard shutting down");
    true
}

/// Resolves once shutdown has been requested, from Ctrl-C or from the app.
pub async fn signal(app: Arc<AppState>) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = app.shutdown.cancelled() => {}
        _ = ctrl_c => {
            request_shutdown(&app, "ctrl-c");
        }
    }
}
