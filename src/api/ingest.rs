//! Audio and text submission handlers

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::ApiState;

/// `POST /audio` — enqueue raw audio bytes for transcription.
///
/// Replies `202` as soon as the payload is queued; processing is
/// asynchronous. A full queue is `503`, telling the client to retry later.
pub async fn handle_audio(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "empty audio payload"})),
        )
            .into_response();
    }

    let bytes = body.len();
    if state.queue.try_submit(body.to_vec()) {
        tracing::info!(bytes, "queued audio submission");
        (
            StatusCode::ACCEPTED,
            Json(json!({"status": "received", "bytes": bytes})),
        )
            .into_response()
    } else {
        tracing::warn!(bytes, "ingestion queue full, rejecting audio");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "queue full, try again later"})),
        )
            .into_response()
    }
}

/// `POST /text` — enqueue an already-textual command.
///
/// The payload is tagged with the text sentinel so the pipeline skips
/// transcription.
pub async fn handle_text(State(state): State<Arc<ApiState>>, body: String) -> Response {
    let text = body.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "empty text payload"})),
        )
            .into_response();
    }

    if state.queue.try_submit_text(text) {
        tracing::info!(text = %text, "queued text submission");
        (
            StatusCode::ACCEPTED,
            Json(json!({"status": "received", "text": text})),
        )
            .into_response()
    } else {
        tracing::warn!("ingestion queue full, rejecting text");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "queue full, try again later"})),
        )
            .into_response()
    }
}
