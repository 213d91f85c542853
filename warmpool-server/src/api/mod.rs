//! API Routes
//!
//! Operator endpoints over the pool registry and the hybrid monitor.

mod monitor;
mod pools;

#[cfg(test)]
mod pools_tests;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use warmpool_types::{RegistryError, WarmpoolConfig};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Pools
        .route("/pools/status", get(pools::get_pools_status))
        .route("/pools/health-check", post(pools::run_health_check))
        .route("/pools/:account_id", get(pools::get_pool_status))
        .route("/pools/:account_id", delete(pools::remove_pool))
        .route("/pools/:account_id/recreate", post(pools::recreate_pool))
        // Account-store notifications
        .route("/accounts/sync", post(pools::sync_account))
        // Monitor
        .route("/monitor/report", get(monitor::get_monitor_report))
        .route("/monitor/connections/:account_id", get(monitor::get_connection_state))
        .route("/monitor/performance", post(monitor::run_performance_sweep))
        // Config
        .route("/config", get(get_config))
}

pub(crate) type ApiError = (StatusCode, String);

pub(crate) fn registry_error(e: RegistryError) -> ApiError {
    let status = match &e {
        RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
        RegistryError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::Config(_) => StatusCode::BAD_REQUEST,
        RegistryError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn get_config(State(state): State<AppState>) -> Json<WarmpoolConfig> {
    Json(state.config().clone())
}
