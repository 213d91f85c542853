use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use warmpool_core::MonitoringReport;
use warmpool_types::{ConnectionState, PerformanceSnapshot};

use super::ApiError;
use crate::state::AppState;

pub async fn get_monitor_report(State(state): State<AppState>) -> Json<MonitoringReport> {
    Json(state.monitor().get_monitoring_report())
}

pub async fn get_connection_state(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<ConnectionState>, ApiError> {
    state
        .monitor()
        .get_connection_state(&account_id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No cached state for account: {}", account_id)))
}

pub async fn run_performance_sweep(State(state): State<AppState>) -> Json<PerformanceSnapshot> {
    Json(state.monitor().run_performance_sweep())
}
