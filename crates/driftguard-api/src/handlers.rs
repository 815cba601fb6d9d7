//! HTTP handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use driftguard_metrics::{CONTENT_TYPE, CounterValues};
use driftguard_reconcile::LoopStatus;

use crate::{ApiState, DiagnosticsState};

/// Response wrapper for the JSON endpoints.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Loop status together with the counters.
#[derive(Serialize)]
struct StatusView {
    #[serde(flatten)]
    status: LoopStatus,
    counters: CounterValues,
}

// ── Scrape ─────────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.registry.render().await;
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// ── Diagnostics ────────────────────────────────────────────────

/// GET /debug/status
pub async fn loop_status(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    let status = state.status.read().await.clone();
    ApiResponse::ok(StatusView {
        status,
        counters: state.registry.counters().values(),
    })
}

/// GET /debug/snapshot
pub async fn metrics_snapshot(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    let snapshot = state.registry.current().await;
    ApiResponse::ok(snapshot.as_ref().clone())
}
