//! REST API handlers.
//!
//! Writes go to the in-memory feeds; reads come from `StateStore` and the
//! metrics collector. Responses use the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use predscale_core::{RawForecast, UtilizationSample};

use crate::ApiState;

const DEFAULT_DECISION_LIMIT: usize = 50;
const MAX_DECISION_LIMIT: usize = 1000;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Inputs ─────────────────────────────────────────────────────

/// POST /api/v1/forecasts
pub async fn publish_forecasts(
    State(state): State<ApiState>,
    Json(batch): Json<Vec<RawForecast>>,
) -> impl IntoResponse {
    let submitted = batch.len();
    let report = state.forecasts.publish(batch);
    let rejected: Vec<String> = report.rejected.iter().map(|e| e.to_string()).collect();
    if !rejected.is_empty() {
        state.metrics.record_rejected_forecasts(rejected.len());
    }
    debug!(submitted, stored = report.stored, rejected = rejected.len(), "forecasts received");

    if submitted > 0 && rejected.len() == submitted {
        return error_response(&rejected.join("; "), StatusCode::UNPROCESSABLE_ENTITY)
            .into_response();
    }
    (
        StatusCode::ACCEPTED,
        ApiResponse::ok(serde_json::json!({
            "stored": report.stored,
            "rejected": rejected,
        })),
    )
        .into_response()
}

/// POST /api/v1/utilization
pub async fn publish_utilization(
    State(state): State<ApiState>,
    Json(sample): Json<UtilizationSample>,
) -> impl IntoResponse {
    match state.utilization.publish(sample) {
        Ok(()) => (StatusCode::ACCEPTED, ApiResponse::ok(sample)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response(),
    }
}

// ── Planner ────────────────────────────────────────────────────

/// GET /api/v1/state
pub async fn get_state(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.get_planner_state(&state.workload) {
        Ok(Some(planner)) => ApiResponse::ok(planner).into_response(),
        Ok(None) => error_response("no planner state yet", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Query parameters for the decision history.
#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/decisions?limit=N
pub async fn list_decisions(
    State(state): State<ApiState>,
    Query(query): Query<DecisionsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DECISION_LIMIT)
        .min(MAX_DECISION_LIMIT);
    match state.store.list_recent_decisions(&state.workload, limit) {
        Ok(decisions) => ApiResponse::ok(decisions).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Metrics ────────────────────────────────────────────────────

/// GET /api/v1/metrics
pub async fn metrics_snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.metrics.snapshot())
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = predscale_metrics::render_prometheus(&state.workload, &state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use predscale_core::*;
    use predscale_ingest::{ForecastFeed, UtilizationFeed};
    use predscale_metrics::PlannerMetrics;
    use predscale_state::StateStore;

    fn test_state() -> ApiState {
        ApiState {
            workload: "default/api".to_string(),
            store: StateStore::open_in_memory().unwrap(),
            metrics: Arc::new(PlannerMetrics::default()),
            forecasts: ForecastFeed::new("requests_per_second"),
            utilization: UtilizationFeed::new(),
        }
    }

    fn raw(horizon: u32, lower: f64, point: f64, upper: f64) -> RawForecast {
        RawForecast {
            metric: "requests_per_second".to_string(),
            horizon_minutes: horizon,
            point,
            lower,
            upper,
            generated_at: 1000,
        }
    }

    fn decision(target: u32, decided_at: u64) -> ScalingDecision {
        ScalingDecision {
            workload: "default/api".to_string(),
            target_replicas: target,
            resources: ResourceProfile::default(),
            ramp: Ramp::Immediate,
            rationale: DecisionRationale::Forecast,
            mode: ScalingMode::Predictive,
            decided_at,
        }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn publish_forecasts_stores_valid_records() {
        let state = test_state();
        let resp = publish_forecasts(
            State(state.clone()),
            Json(vec![raw(5, 80.0, 100.0, 120.0), raw(15, 90.0, 110.0, 130.0)]),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(state.forecasts.snapshot().len(), 2);

        let body = body_json(resp).await;
        assert_eq!(body["data"]["stored"], 2);
    }

    #[tokio::test]
    async fn publish_forecasts_partial_rejection() {
        let state = test_state();
        let resp = publish_forecasts(
            State(state.clone()),
            Json(vec![raw(5, 80.0, 100.0, 120.0), raw(15, 150.0, 110.0, 130.0)]),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(state.metrics.snapshot().forecasts_rejected_total, 1);

        let body = body_json(resp).await;
        assert_eq!(body["data"]["rejected"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_forecasts_all_invalid() {
        let state = test_state();
        let resp = publish_forecasts(State(state.clone()), Json(vec![raw(0, 1.0, 1.0, 1.0)]))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.forecasts.snapshot().is_empty());

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn publish_utilization() {
        let state = test_state();
        let sample = UtilizationSample {
            utilization: 0.9,
            observed_at: 1000,
        };
        let resp = super::publish_utilization(State(state.clone()), Json(sample))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(state.utilization.latest(), Some(sample));

        let bad = UtilizationSample {
            utilization: -1.0,
            observed_at: 1001,
        };
        let resp = super::publish_utilization(State(state), Json(bad))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn state_not_found_before_first_tick() {
        let resp = get_state(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn state_returns_persisted_planner_state() {
        let state = test_state();
        state
            .store
            .put_planner_state(&PlannerState::initial("default/api", 4))
            .unwrap();
        let resp = get_state(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["current_replicas"], 4);
        assert_eq!(body["data"]["mode"], "predictive");
    }

    #[tokio::test]
    async fn decisions_respect_limit() {
        let state = test_state();
        for i in 0..5u64 {
            state.store.append_decision(&decision(3, 1000 + i * 60)).unwrap();
        }
        let resp = list_decisions(
            State(state),
            Query(DecisionsQuery { limit: Some(2) }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["decided_at"], 1240);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let resp = prometheus_metrics(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("predscale_mode{workload=\"default/api\"} 0"));
    }

    #[tokio::test]
    async fn metrics_snapshot_is_json() {
        let resp = metrics_snapshot(State(test_state())).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body["data"]["mode"], "predictive");
    }
}
