//! Warmpool Server - Headless Daemon
//!
//! Keeps a pre-warmed pair of proxy connections per account and exposes the
//! operator status surface on /api/*.
//!
//! Lifecycle: config → logging → account store → registry.initialize_all →
//! monitor.start → serve; on Ctrl-C / SIGTERM: monitor.stop →
//! registry.destroy_all → exit.

use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

mod api;
mod server_utils;
mod state;

#[cfg(test)]
mod test_helpers;

use state::AppState;
use warmpool_core::{config, logger, HybridMonitor, JsonAccountStore, PoolRegistry, TunnelDriver};
use warmpool_types::WarmpoolConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let mut app_config =
        config::load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    apply_env_overrides(&mut app_config);

    let _log_guard = logger::init_logging(&app_config.logging);
    info!("Warmpool Server starting on {}...", app_config.server.socket_addr());

    let data_dir = config::get_data_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get data directory: {}", e))?;
    let accounts_path = config::resolve_in_data_dir(&data_dir, &app_config.server.accounts_file);
    info!(path = %accounts_path.display(), "Using accounts file");

    let store = Arc::new(JsonAccountStore::new(accounts_path));
    let driver = Arc::new(TunnelDriver::from_settings(&app_config.pool));
    let registry = Arc::new(PoolRegistry::from_config(store, driver, &app_config));

    let summary = registry.initialize_all().await?;
    info!(
        pools = summary.initialized,
        skipped = summary.skipped,
        failed = summary.failed,
        "Connection pools ready"
    );

    let monitor = HybridMonitor::new(registry.clone(), app_config.monitor.clone());
    monitor.start();

    let state = AppState::new(registry.clone(), monitor.clone(), app_config.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(app_config.server.socket_addr()).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(server_utils::shutdown_signal())
        .await?;

    monitor.stop();
    let report = registry.destroy_all(app_config.shutdown.timeout()).await;
    if report.timeout {
        warn!(
            completed = report.completed,
            forced = report.forced,
            elapsed_ms = report.elapsed_ms,
            "Shutdown finished after timeout"
        );
    } else {
        info!(completed = report.completed, elapsed_ms = report.elapsed_ms, "Shutdown complete");
    }

    Ok(())
}

fn apply_env_overrides(config: &mut WarmpoolConfig) {
    if let Some(port) = std::env::var("WARMPOOL_PORT").ok().and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }
    if let Ok(accounts_file) = std::env::var("WARMPOOL_ACCOUNTS") {
        config.server.accounts_file = accounts_file;
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api::router())
        .route("/healthz", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(serde_json::json!({"status": "ok"})))
}
