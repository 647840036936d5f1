//! Per-request deadline.
//!
//! Sits innermost in the chain: when the deadline passes, the in-flight
//! handler future is dropped (cancelling its downstream calls) and the
//! request surfaces `DeadlineExceeded`. The idempotency layer outside sees
//! the 5xx and writes nothing, so the client can retry safely.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use shared_types::{ErrorCode, RequestId};
use tracing::warn;

/// Enforce the configured request timeout.
pub async fn enforce(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate);
    let path = req.uri().path().to_string();

    match tokio::time::timeout(state.config.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(request_id = %request_id, path = %path, "Request deadline exceeded");
            ApiError::new(
                ErrorCode::DeadlineExceeded,
                "request deadline exceeded",
                request_id,
            )
            .into_response()
        }
    }
}
