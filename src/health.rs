//! Liveness and readiness endpoints.
//!
//! These sit outside the family routers: they are never proxied and never
//! produce request events.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

pub async fn liveness(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Readiness currently mirrors liveness; upstream connectivity probes could
/// hang off this handler if they are ever needed.
pub async fn readiness(state: State<AppState>) -> Json<HealthResponse> {
    liveness(state).await
}
