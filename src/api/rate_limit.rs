//! Fixed-window per-client rate limiting
//!
//! One bucket per client key. A client's first request opens a window with
//! `rate - 1` tokens remaining; once a full window has elapsed since the
//! bucket was opened, the next request resets it to `rate` and spends one.
//! Buckets are never evicted, which is acceptable at the expected client
//! cardinality (a handful of home devices behind one gateway).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::ApiState;

struct Bucket {
    tokens: u32,
    window_start: Instant,
}

/// Fixed-window limiter keyed by client IP
pub struct RateLimiter {
    rate: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate: u32, window: Duration) -> Self {
        Self {
            rate,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `client` may proceed right now
    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: &str, now: Instant) -> bool {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match buckets.get_mut(client) {
            None => {
                buckets.insert(
                    client.to_string(),
                    Bucket {
                        tokens: self.rate.saturating_sub(1),
                        window_start: now,
                    },
                );
                true
            }
            Some(bucket) => {
                if now.duration_since(bucket.window_start) > self.window {
                    bucket.tokens = self.rate;
                    bucket.window_start = now;
                }
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Proxy-aware client key: `X-Forwarded-For`, then `X-Real-IP`, then the
/// socket peer address.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            let value = value.split(',').next().unwrap_or(value).trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Rejects over-limit submissions with `429` before they reach a handler
pub async fn middleware(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_key(request.headers(), peer);

    if state.limiter.allow(&client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    // -- limiter ------------------------------------------------------------

    #[test]
    fn first_window_admits_exactly_rate_requests() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now), "fourth must be rejected");
    }

    #[test]
    fn window_elapse_refills_the_bucket() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.allow_at("10.0.0.1", start));
        assert!(limiter.allow_at("10.0.0.1", start));
        assert!(!limiter.allow_at("10.0.0.1", start));

        let later = start + Duration::from_secs(61);
        assert!(limiter.allow_at("10.0.0.1", later));
        assert!(limiter.allow_at("10.0.0.1", later));
        assert!(!limiter.allow_at("10.0.0.1", later));
    }

    #[test]
    fn exactly_one_window_does_not_refill() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.allow_at("10.0.0.1", start));
        assert!(!limiter.allow_at("10.0.0.1", start + Duration::from_secs(60)));
        assert!(limiter.allow_at("10.0.0.1", start + Duration::from_secs(61)));
    }

    #[test]
    fn clients_are_limited_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.2", now));
    }

    // -- client key ---------------------------------------------------------

    #[test]
    fn forwarded_for_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        let peer = "127.0.0.1:1234".parse().ok();

        assert_eq!(client_key(&headers, peer), "1.2.3.4");
    }

    #[test]
    fn real_ip_is_used_when_no_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));

        assert_eq!(client_key(&headers, "127.0.0.1:1234".parse().ok()), "9.9.9.9");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, "192.168.1.7:9000".parse().ok()), "192.168.1.7");
        assert_eq!(client_key(&headers, None), "unknown");
    }
}
