//! Liveness and hub statistics.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use shared_types::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
}

/// `GET /healthz`: unauthenticated liveness probe.
pub async fn healthz(State(state): State<AppState>) -> Json<ApiResponse<HealthData>> {
    let stats = state.hub.stats().await.unwrap_or(cp_06_realtime::HubStats {
        connections: 0,
        rooms: 0,
    });
    Json(ApiResponse::ok(HealthData {
        status: "ok",
        connections: stats.connections,
        rooms: stats.rooms,
    }))
}
