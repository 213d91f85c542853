use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;
use warmpool_core::SyncAction;
use warmpool_types::{AccountRecord, HealthCheckReport, PoolStatus, RegistryError, RegistryStatus};

use super::{registry_error, ApiError};
use crate::state::AppState;

pub async fn get_pools_status(State(state): State<AppState>) -> Json<RegistryStatus> {
    Json(state.registry().get_all_status())
}

pub async fn get_pool_status(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<PoolStatus>, ApiError> {
    state
        .registry()
        .get_status(&account_id)
        .map(Json)
        .ok_or_else(|| registry_error(RegistryError::not_found(&account_id)))
}

/// On-demand health sweep through the monitor, so the cache is reconciled too.
pub async fn run_health_check(State(state): State<AppState>) -> Json<HealthCheckReport> {
    Json(state.monitor().run_health_check())
}

pub async fn recreate_pool(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<PoolStatus>, ApiError> {
    let registry = state.registry();
    if !registry.is_initialized() {
        return Err(registry_error(RegistryError::NotInitialized));
    }
    info!(account_id = %account_id, "Recreate requested via API");
    registry.recreate_connection(&account_id).await.map(Json).map_err(registry_error)
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub account_id: String,
    pub removed: bool,
}

pub async fn remove_pool(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<RemoveResponse>, ApiError> {
    if !state.registry().remove(&account_id).await {
        return Err(registry_error(RegistryError::not_found(&account_id)));
    }
    Ok(Json(RemoveResponse { account_id, removed: true }))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub account_id: String,
    pub action: SyncAction,
}

pub async fn sync_account(
    State(state): State<AppState>,
    Json(account): Json<AccountRecord>,
) -> Result<(StatusCode, Json<SyncResponse>), ApiError> {
    let action = state.registry().sync_account(&account).await.map_err(registry_error)?;
    let status = if action == SyncAction::Added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(SyncResponse { account_id: account.id, action })))
}
