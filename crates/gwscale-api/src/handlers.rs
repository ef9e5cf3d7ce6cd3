//! Status handlers. Every handler only reads from the `StateStore`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;

use crate::ApiState;

const DEFAULT_REPORT_LIMIT: usize = 20;
const MAX_REPORT_LIMIT: usize = 500;

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

/// GET /api/v1/state
pub async fn get_state(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.load_engine_state(&state.pool) {
        Ok(engine) => ApiResponse::ok(engine).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/report
pub async fn latest_report(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.latest_report(&state.pool) {
        Ok(Some(report)) => ApiResponse::ok(report).into_response(),
        Ok(None) => error_response("no tick report yet", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/reports?limit=N
pub async fn list_reports(
    State(state): State<ApiState>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REPORT_LIMIT)
        .clamp(1, MAX_REPORT_LIMIT);
    match state.store.list_reports(&state.pool, limit) {
        Ok(reports) => ApiResponse::ok(reports).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/pools
pub async fn list_pools(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_pools() {
        Ok(pools) => ApiResponse::ok(pools).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let pools = state.store.list_pools().unwrap_or_else(|e| {
        warn!(error = %e, "cannot list pools for exposition");
        Vec::new()
    });

    let reports: Vec<_> = pools
        .iter()
        .filter_map(|pool| state.store.latest_report(pool).ok().flatten())
        .collect();

    let body = gwscale_metrics::render_prometheus(&reports);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}
