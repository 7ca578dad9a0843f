use std::sync::Arc;

use axum::{routing::get, Router};
use burrow_core::config::BurrowConfig;
use burrow_core::status::StatusSource;
use tokio_util::sync::CancellationToken;

use crate::ws::broadcast::Hub;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: BurrowConfig,
    /// Fan-out to every open `/_ws` stream.
    pub hub: Hub,
    /// Backing data for `/rest/status`.
    pub status: Arc<dyn StatusSource>,
    /// Cancelled once shutdown starts.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: BurrowConfig, hub: Hub, status: Arc<dyn StatusSource>) -> Self {
        Self {
            config,
            hub,
            status,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::root_redirect))
        .route("/_ws", get(crate::ws::connection::ws_handler))
        .route("/static/{*path}", get(crate::http::ui::static_handler))
        .route("/rest/status", get(crate::http::status::status_handler))
        .route("/rest/exit", get(crate::http::exit::exit_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
