//! Request-ID propagation and the structured access log.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use shared_types::RequestId;
use std::time::Instant;
use tracing::info;

/// Accept `X-Request-ID` or mint one; attach it to the request extensions,
/// echo it on the response, and emit the access log line.
pub async fn propagate(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(RequestId::from_header)
        .unwrap_or_else(RequestId::generate);

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(request_id.clone());

    let start = Instant::now();
    let mut response = next.run(req).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert("X-Request-ID", value);
    }

    info!(
        request_id = %request_id,
        service = "api-gateway",
        method = %method,
        path = %path,
        duration_ms,
        status = response.status().as_u16(),
        "Request handled"
    );

    response
}
