//! HTTP ingestion boundary
//!
//! Three submission surfaces (`/audio`, `/text`, `/alexa`) feed one bounded
//! queue consumed by the pipeline; `/health` reports liveness and queue
//! depth. Submission endpoints sit behind the per-client rate limiter,
//! health does not.

pub mod alexa;
pub mod health;
pub mod ingest;
pub mod rate_limit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domain::TEXT_COMMAND_PREFIX;
use crate::{Error, Result};
use rate_limit::RateLimiter;

/// Maximum accepted audio upload
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;
/// Maximum accepted text submission
pub const MAX_TEXT_BYTES: usize = 1024;
/// Maximum accepted voice-skill webhook body
pub const MAX_WEBHOOK_BYTES: usize = 8192;

/// Bounded handoff between ingestion handlers and the pipeline.
///
/// Enqueue never blocks: a full queue is reported to the producer
/// immediately, which is the backpressure policy protecting the
/// single-consumer pipeline from bursty input.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl IngestQueue {
    /// Create a queue of fixed capacity along with its consumer half
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Try to enqueue a raw payload; `false` means full (or closed), and the
    /// caller should tell the producer to try again later.
    pub fn try_submit(&self, payload: Vec<u8>) -> bool {
        self.tx.try_send(payload).is_ok()
    }

    /// Enqueue already-transcribed text with the sentinel prefix applied
    pub fn try_submit_text(&self, text: &str) -> bool {
        self.try_submit(format!("{TEXT_COMMAND_PREFIX}{text}").into_bytes())
    }

    /// Number of payloads currently queued
    #[must_use]
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Shared state for ingestion handlers
pub struct ApiState {
    pub queue: IngestQueue,
    pub limiter: RateLimiter,
    /// Shared secret required by the voice-skill webhook, when configured
    pub webhook_secret: Option<String>,
    pub running: AtomicBool,
}

impl ApiState {
    #[must_use]
    pub fn new(queue: IngestQueue, limiter: RateLimiter, webhook_secret: Option<String>) -> Self {
        Self {
            queue,
            limiter,
            webhook_secret,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Build the full ingestion router.
///
/// Per-endpoint body caps are applied before the shared rate-limit
/// middleware; `/health` is mounted outside the rate-limited subtree.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    let audio = Router::new()
        .route("/audio", post(ingest::handle_audio))
        .layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES));
    let text = Router::new()
        .route("/text", post(ingest::handle_text))
        .layer(DefaultBodyLimit::max(MAX_TEXT_BYTES));
    // no body-limit layer here: the webhook handler caps the body itself so
    // oversized requests still get a speakable reply, not a 413
    let webhook = Router::new().route("/alexa", post(alexa::handle_request));

    let submissions = audio.merge(text).merge(webhook).layer(
        axum::middleware::from_fn_with_state(state.clone(), rate_limit::middleware),
    );

    let health = Router::new().route("/health", get(health::handle));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    submissions
        .merge(health)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Ingestion HTTP server with bounded-grace shutdown
pub struct ApiServer {
    state: Arc<ApiState>,
    addr: String,
    shutdown_grace: Duration,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<ApiState>, addr: String, shutdown_grace: Duration) -> Self {
        Self {
            state,
            addr,
            shutdown_grace,
        }
    }

    /// Serve until the token fires, then stop accepting connections and give
    /// in-flight requests `shutdown_grace` to finish before forcing close.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind ingestion server: {e}")))?;

        tracing::info!(addr = %self.addr, "ingestion server listening");
        self.state.running.store(true, Ordering::SeqCst);

        let shutdown = cancel.clone();
        let server = axum::serve(
            listener,
            router(self.state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

        let grace = self.shutdown_grace;
        let result = tokio::select! {
            res = server => {
                res.map_err(|e| Error::Config(format!("ingestion server error: {e}")))
            }
            () = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!("graceful shutdown grace period elapsed, forcing close");
                Ok(())
            }
        };

        self.state.running.store(false, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strip_text_prefix;

    #[test]
    fn queue_rejects_when_full_without_blocking() {
        let (queue, _rx) = IngestQueue::new(2);

        assert!(queue.try_submit(vec![1]));
        assert!(queue.try_submit(vec![2]));
        assert!(!queue.try_submit(vec![3]), "third submit must be rejected");
        assert_eq!(queue.depth(), 2);
    }

    #[test]
    fn queue_depth_tracks_consumption() {
        let (queue, mut rx) = IngestQueue::new(4);

        assert!(queue.try_submit(vec![1]));
        assert!(queue.try_submit(vec![2]));
        assert_eq!(queue.depth(), 2);

        rx.try_recv().unwrap();
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn queue_rejects_after_receiver_dropped() {
        let (queue, rx) = IngestQueue::new(2);
        drop(rx);
        assert!(!queue.try_submit(vec![1]));
    }

    #[test]
    fn text_submissions_carry_the_sentinel() {
        let (queue, mut rx) = IngestQueue::new(1);

        assert!(queue.try_submit_text("prende la luz"));
        let payload = rx.try_recv().unwrap();
        assert_eq!(strip_text_prefix(&payload), Some("prende la luz"));
    }
}
