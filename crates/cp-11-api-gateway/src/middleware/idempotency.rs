//! Idempotent replay of mutating requests.
//!
//! Applied after authentication. GETs pass straight through; mutations are
//! keyed (explicit `Idempotency-Key` header wins, else the derived hash of
//! user/method/path/query/body) and replayed from the cache on a hit.
//!
//! Responses that indicate the work may not have happened (5xx, deadline
//! expiry) are never cached, so clients can retry them safely.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use cp_05_authz::EffectiveScope;
use cp_08_idempotency::{IdempotencyKey, IdempotencyRecord, StoredResponse};
use shared_types::{ErrorCode, RequestId};
use tracing::debug;

fn replay_response(stored: &StoredResponse, request_id: &RequestId) -> Response {
    let mut response = Response::new(Body::from(stored.body.clone()));
    *response.status_mut() =
        StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert("X-Request-ID", value);
    }
    headers.insert("X-Idempotent-Replay", HeaderValue::from_static("true"));
    response
}

/// Collapse retried mutations into one execution.
pub async fn collapse_retries(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !matches!(
        *req.method(),
        Method::POST | Method::PATCH | Method::PUT | Method::DELETE
    ) {
        return Ok(next.run(req).await);
    }

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(RequestId::generate);
    let user_id = req
        .extensions()
        .get::<EffectiveScope>()
        .map(|s| s.user_id.clone())
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::TokenMissing,
                "authentication required",
                request_id.clone(),
            )
        })?;

    let explicit_key = req
        .headers()
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, state.config.body_limit_bytes)
        .await
        .map_err(|_| {
            ApiError::new(
                ErrorCode::BodyTooLarge,
                "request body too large",
                request_id.clone(),
            )
        })?;

    let key = match explicit_key {
        Some(header) => IdempotencyKey::explicit(&user_id, &header),
        None => IdempotencyKey::derive(&user_id, &method, &path, &query, &bytes),
    };

    if let Ok(Some(record)) = state.idempotency.get(&key).await {
        debug!(key = %key, "Idempotency hit, replaying stored response");
        return Ok(replay_response(&record.response, &request_id));
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(req).await;

    // Never cache outcomes the client must retry.
    let status = response.status();
    if status.is_server_error() {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let body_bytes = to_bytes(body, usize::MAX).await.map_err(|_| {
        ApiError::new(
            ErrorCode::Internal,
            "response capture failed",
            request_id.clone(),
        )
    })?;

    let record = IdempotencyRecord::new(
        StoredResponse {
            status: status.as_u16(),
            body: body_bytes.to_vec(),
        },
        Utc::now(),
    );
    let stored_by_us = state
        .idempotency
        .put_if_absent(&key, record)
        .await
        .unwrap_or(false);

    if !stored_by_us {
        // A racing retry stored first; replay its copy so both clients see
        // byte-identical responses.
        if let Ok(Some(existing)) = state.idempotency.get(&key).await {
            return Ok(replay_response(&existing.response, &request_id));
        }
    }

    Ok(Response::from_parts(parts, Body::from(body_bytes)))
}
