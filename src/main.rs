//! Service mesh daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     SERVICE MESH                     │
//!                      │                                                      │
//!   Application call   │  ┌────────────┐   ┌─────────────┐   ┌─────────────┐  │
//!   ───────────────────┼─▶│ monitoring │──▶│  resilient  │──▶│  transport  │──┼──▶ Service
//!                      │  │   façade   │   │   client    │   │   (HTTP)    │  │
//!                      │  └─────┬──────┘   └──────┬──────┘   └─────────────┘  │
//!                      │        │                 │                          │
//!                      │        ▼                 ▼                          │
//!                      │  ┌────────────┐   ┌─────────────┐                    │
//!                      │  │  tracer +  │   │  registry   │◀──┐                │
//!                      │  │ collector  │   │             │   │                │
//!                      │  └────────────┘   └─────────────┘   │                │
//!                      │        ▲                     ┌──────┴──────┐         │
//!                      │        └─────────────────────│   health    │─────────┼──▶ /health
//!                      │                              │   checker   │         │
//!                      │                              └─────────────┘         │
//!                      │  ┌────────────────────────────────────────────────┐  │
//!                      │  │ config · logging · prometheus · admin API      │  │
//!                      │  └────────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `service-mesh [config.toml]`. The path may also come from
//! `MESH_CONFIG`; without one the configuration is built from defaults
//! and environment variables.

use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use service_mesh::admin;
use service_mesh::config::loader::{config_from_env, load_config};
use service_mesh::lifecycle::signals::spawn_signal_handler;
use service_mesh::observability::{logging, metrics};
use service_mesh::{ServiceMesh, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MESH_CONFIG").ok());
    let config = match config_path {
        Some(path) => load_config(Path::new(&path))?,
        None => config_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        services = config.enabled_services().count(),
        "service-mesh starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let admin_config = config.admin.clone();
    let mesh = Arc::new(ServiceMesh::new(config)?);
    mesh.initialize().await?;

    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone());

    if admin_config.enabled {
        let listener = TcpListener::bind(&admin_config.bind_address).await?;
        let router = admin::setup_admin_router(mesh.clone(), &admin_config);
        admin::serve(listener, router, shutdown.clone()).await?;
    } else {
        shutdown.wait().await;
    }

    mesh.shutdown().await;
    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
