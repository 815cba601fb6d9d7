//! driftguard-api — HTTP surface of the daemon.
//!
//! Two routers, served on separate listeners:
//!
//! | Method | Path | Router | Description |
//! |---|---|---|---|
//! | GET | `/metrics` | scrape | Prometheus exposition |
//! | GET | `/healthz` | scrape | Liveness |
//! | GET | `/debug/status` | diagnostics | Loop status as JSON |
//! | GET | `/debug/snapshot` | diagnostics | Published metrics snapshot as JSON |
//!
//! The diagnostics router is meant for a loopback address only.

pub mod handlers;

use axum::Router;
use axum::routing::get;

use driftguard_metrics::MetricsRegistry;
use driftguard_reconcile::SharedStatus;

/// State for the scrape router.
#[derive(Clone)]
pub struct ApiState {
    pub registry: MetricsRegistry,
}

/// State for the diagnostics router.
#[derive(Clone)]
pub struct DiagnosticsState {
    pub registry: MetricsRegistry,
    pub status: SharedStatus,
}

/// Build the scrape router (`/metrics`, `/healthz`).
pub fn build_router(registry: MetricsRegistry) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(ApiState { registry })
}

/// Build the diagnostics router (`/debug/status`, `/debug/snapshot`).
pub fn build_diagnostics_router(registry: MetricsRegistry, status: SharedStatus) -> Router {
    Router::new()
        .route("/debug/status", get(handlers::loop_status))
        .route("/debug/snapshot", get(handlers::metrics_snapshot))
        .with_state(DiagnosticsState { registry, status })
}
