use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::health::OverallStatus;
use crate::lifecycle::{HealthReport, ServiceStatus};
use crate::monitoring::SystemHealth;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
pub struct MeshStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: &'static str,
    pub caller_name: String,
    pub initialized: bool,
    pub registered_services: usize,
    pub overall: OverallStatus,
    pub traces_retained: usize,
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

pub async fn get_status(State(state): State<AdminState>) -> Json<MeshStatus> {
    let mesh = &state.mesh;
    Json(MeshStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: mesh.config().environment.as_str(),
        caller_name: mesh.config().caller_name.clone(),
        initialized: mesh.is_initialized().await,
        registered_services: mesh.registry().len(),
        overall: mesh.system_health().overall,
        traces_retained: mesh.monitoring().tracer().trace_count(),
    })
}

pub async fn get_health(State(state): State<AdminState>) -> Json<SystemHealth> {
    Json(state.mesh.system_health())
}

pub async fn run_health_check(State(state): State<AdminState>) -> Json<HealthReport> {
    Json(state.mesh.perform_health_check().await)
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(state.mesh.service_status())
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.mesh.client().breaker_snapshots())
}

pub async fn get_service_metrics(State(state): State<AdminState>, Path(service): Path<String>) -> Response {
    match state.mesh.monitoring().collector().get_metrics(&service) {
        Some(metrics) => Json(metrics).into_response(),
        None => not_found(format!("no metrics recorded for {}", service)),
    }
}

pub async fn get_trace(State(state): State<AdminState>, Path(trace_id): Path<String>) -> Response {
    let spans = state.mesh.monitoring().tracer().get_trace(&trace_id);
    if spans.is_empty() {
        return not_found(format!("trace {} not found", trace_id));
    }
    Json(json!({ "trace_id": trace_id, "spans": spans })).into_response()
}
