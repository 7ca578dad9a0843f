use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use burrow_protocol::status::StatusDocument;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("status serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "status request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// GET /rest/status: point-in-time tunnel, connection and traffic summary.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let doc = StatusDocument::snapshot(state.status.as_ref());
    let body = serde_json::to_vec(&doc)?;
    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}
