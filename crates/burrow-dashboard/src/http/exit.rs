use axum::{extract::State, http::StatusCode};
use std::sync::Arc;

use crate::app::AppState;

/// GET /rest/exit: stop the dashboard. Open streams are closed cleanly and
/// the server drains before the process exits.
pub async fn exit_handler(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if crate::shutdown::request_shutdown(&state, "rest/exit") {
        (StatusCode::ACCEPTED, "shutting down")
    } else {
        (StatusCode::ACCEPTED, "already shutting down")
    }
}
