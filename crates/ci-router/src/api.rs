//! HTTP monitoring API
//!
//! - `/__health`: JSON report of the dependency checks and stream workers
//! - `/__gtg`: 200 when the queue proxy and every writer are reachable, else 503
//! - `/__ping`, `/ping`: liveness
//! - `/__build-info`, `/build-info`: service version
//! - `/metrics`: Prometheus exposition

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::health::{check_consumers, HealthChecker, HealthReport};
use crate::manager::IngestionManager;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthChecker>,
    pub manager: Option<Arc<IngestionManager>>,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
}

#[derive(Serialize)]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/__health", get(health_handler))
        .route("/__gtg", get(gtg_handler))
        .route("/__ping", get(ping_handler))
        .route("/ping", get(ping_handler))
        .route("/__build-info", get(build_info_handler))
        .route("/build-info", get(build_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let mut report = state.health.report().await;
    if let Some(manager) = &state.manager {
        report.push_check(check_consumers(manager));
    }
    Json(report)
}

async fn gtg_handler(State(state): State<AppState>) -> StatusCode {
    if state.health.is_good_to_go().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn ping_handler() -> &'static str {
    "pong"
}

async fn build_info_handler(State(state): State<AppState>) -> Json<BuildInfo> {
    Json(BuildInfo {
        name: "concept-ingester".to_string(),
        version: state.version.clone(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let output = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
        .into_response()
}
