//! Operator-facing admin API.
//!
//! # Routes
//! ```text
//! GET  /admin/status               mesh summary
//! GET  /admin/health               system health (registry + metrics)
//! POST /admin/health/check         on-demand health sweep
//! GET  /admin/services             configured services and their health
//! GET  /admin/breakers             circuit breaker snapshots
//! GET  /admin/metrics/{service}    one service's metrics
//! GET  /admin/traces/{trace_id}    retained spans of one trace
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::lifecycle::{ServiceMesh, Shutdown};

#[derive(Clone)]
pub struct AdminState {
    pub mesh: Arc<ServiceMesh>,
    pub api_key: Arc<str>,
}

#[allow(deprecated)]
pub fn setup_admin_router(mesh: Arc<ServiceMesh>, config: &AdminConfig) -> Router {
    let state = AdminState {
        mesh,
        api_key: Arc::from(config.api_key.as_str()),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/health/check", post(run_health_check))
        .route("/admin/services", get(get_services))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/metrics/{service}", get(get_service_metrics))
        .route("/admin/traces/{trace_id}", get(get_trace))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
        )
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve(listener: TcpListener, router: Router, shutdown: Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
