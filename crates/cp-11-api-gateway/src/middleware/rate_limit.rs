//! Per-client rate limiting.

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use shared_types::{ApiResponse, ErrorCode, RequestId};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

/// Keyed limiter shared by the whole router.
pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Build the shared limiter.
#[must_use]
pub fn build(per_second: u32) -> Arc<IpRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

fn client_ip(req: &Request) -> Option<IpAddr> {
    // Trust X-Forwarded-For only for its first hop, then fall back to the
    // socket address.
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// Reject clients that exceed the per-IP quota.
pub async fn limit(
    axum::extract::State(limiter): axum::extract::State<Arc<IpRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ip) = client_ip(&req) else {
        return next.run(req).await;
    };
    if limiter.check_key(&ip).is_err() {
        warn!(ip = %ip, "Rate limit exceeded");
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::generate);
        let envelope: ApiResponse<serde_json::Value> =
            ApiResponse::error(ErrorCode::Unavailable, "rate limit exceeded", &request_id);
        return (StatusCode::TOO_MANY_REQUESTS, Json(envelope)).into_response();
    }
    next.run(req).await
}
