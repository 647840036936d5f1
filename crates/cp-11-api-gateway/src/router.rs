//! Route table and middleware assembly.

use crate::handlers::{barcodes, courier, health, opcode};
use crate::middleware::{auth, deadline, idempotency, rate_limit, request_id};
use crate::state::AppState;
use crate::ws;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Assemble the full router.
///
/// Layer order on `/api/v1` (outermost first): auth → idempotency →
/// deadline → handler. Request-ID propagation, rate limiting, body limits,
/// tracing and CORS wrap everything, including the WebSocket upgrade.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let limiter = rate_limit::build(state.config.rate_limit_per_sec);
    let body_limit = state.config.body_limit_bytes;

    let api = Router::new()
        .route("/barcodes", post(barcodes::create))
        .route("/barcodes/:code", get(barcodes::get))
        .route("/barcodes/:code/bind", patch(barcodes::bind))
        .route("/barcodes/:code/status", patch(barcodes::status))
        .route("/courier/apply", post(courier::apply))
        .route(
            "/courier/subordinates",
            post(courier::create_subordinate).get(courier::list_subordinates),
        )
        .route("/courier/review", post(courier::review))
        .route("/courier/promote", post(courier::promote))
        .route("/courier/tasks", get(courier::list_tasks))
        .route("/courier/tasks/:id/accept", post(courier::accept_task))
        .route("/courier/tasks/:id/scan", post(courier::scan_task))
        .route("/courier/tasks/:id/next", get(courier::next_action))
        .route("/opcode/:code", get(opcode::get))
        .layer(middleware::from_fn_with_state(state.clone(), deadline::enforce))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency::collapse_retries,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    Router::new()
        .nest("/api/v1", api)
        .route("/ws/connect", get(ws::connect))
        .route("/healthz", get(health::healthz))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(middleware::from_fn(request_id::propagate))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
