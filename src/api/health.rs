//! Liveness endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running: bool,
    pub queue_size: usize,
}

/// `GET /health` — `200` while the server accepts work, `503` otherwise.
/// Never rate limited, so probes cannot starve real clients (or vice versa).
pub async fn handle(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<HealthResponse>) {
    let running = state.is_running();
    let (code, status) = if running {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        code,
        Json(HealthResponse {
            status,
            running,
            queue_size: state.queue.depth(),
        }),
    )
}
