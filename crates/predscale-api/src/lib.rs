//! predscale-api — REST API for the planner daemon.
//!
//! Forecast and utilization producers push into the shared feeds; the loop
//! reads them at the start of each tick. State, history and metrics are
//! read-only views.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/forecasts` | Publish forecast records (JSON array) |
//! | POST | `/api/v1/utilization` | Publish a utilization sample |
//! | GET | `/api/v1/state` | Current planner state |
//! | GET | `/api/v1/decisions?limit=N` | Recent decisions, oldest first |
//! | GET | `/api/v1/metrics` | Metrics snapshot as JSON |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use predscale_core::WorkloadId;
use predscale_ingest::{ForecastFeed, UtilizationFeed};
use predscale_metrics::PlannerMetrics;
use predscale_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub workload: WorkloadId,
    pub store: StateStore,
    pub metrics: Arc<PlannerMetrics>,
    pub forecasts: ForecastFeed,
    pub utilization: UtilizationFeed,
}

/// Build the complete API router (REST + metrics + health).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/forecasts", post(handlers::publish_forecasts))
        .route("/utilization", post(handlers::publish_utilization))
        .route("/state", get(handlers::get_state))
        .route("/decisions", get(handlers::list_decisions))
        .route("/metrics", get(handlers::metrics_snapshot))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
        .route("/healthz", get(handlers::healthz))
}
