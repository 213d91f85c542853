use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;

use warmpool_core::SyncAction;
use warmpool_types::AccountRecord;

use super::pools::{
    get_pool_status, get_pools_status, recreate_pool, remove_pool, run_health_check, sync_account,
};
use crate::test_helpers::{proxy_at, test_app_state};

#[tokio::test]
async fn test_get_pools_status() {
    let ctx = test_app_state(&["a", "b"]).await;
    let Json(status) = get_pools_status(State(ctx.state.clone())).await;
    assert!(status.manager.is_initialized);
    assert_eq!(status.manager.total_pools, 2);
    assert_eq!(status.pools.len(), 2);
}

#[tokio::test]
async fn test_get_pool_status_found_and_missing() {
    let ctx = test_app_state(&["a"]).await;

    let Json(status) = get_pool_status(State(ctx.state.clone()), Path("a".to_string())).await.unwrap();
    assert_eq!(status.account_id, "a");
    assert_eq!(status.connection_state.healthy_slots, 2);

    let (code, _) = get_pool_status(State(ctx.state.clone()), Path("zzz".to_string())).await.unwrap_err();
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check_all_healthy() {
    let ctx = test_app_state(&["a", "b"]).await;
    let Json(report) = run_health_check(State(ctx.state.clone())).await;
    assert_eq!(report.total, 2);
    assert_eq!(report.healthy, 2);
    assert!(report.unhealthy_accounts.is_empty());
}

#[tokio::test]
async fn test_recreate_pool() {
    let ctx = test_app_state(&["a"]).await;

    let Json(status) = recreate_pool(State(ctx.state.clone()), Path("a".to_string())).await.unwrap();
    assert_eq!(status.connection_state.healthy_slots, 2);

    let (code, _) = recreate_pool(State(ctx.state.clone()), Path("missing".to_string())).await.unwrap_err();
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recreate_after_shutdown_is_unavailable() {
    let ctx = test_app_state(&["a"]).await;
    ctx.state.registry().destroy_all(std::time::Duration::from_secs(2)).await;

    let (code, _) = recreate_pool(State(ctx.state.clone()), Path("a".to_string())).await.unwrap_err();
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_remove_pool() {
    let ctx = test_app_state(&["a"]).await;

    let Json(resp) = remove_pool(State(ctx.state.clone()), Path("a".to_string())).await.unwrap();
    assert!(resp.removed);
    assert_eq!(ctx.state.registry().pool_count(), 0);

    let (code, _) = remove_pool(State(ctx.state.clone()), Path("a".to_string())).await.unwrap_err();
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_account_add_then_unchanged() {
    let ctx = test_app_state(&[]).await;
    let record = AccountRecord::new("new", "New", Some(proxy_at(ctx.proxy_port)));

    let (code, Json(resp)) = sync_account(State(ctx.state.clone()), Json(record.clone())).await.unwrap();
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(resp.action, SyncAction::Added);

    let (code, Json(resp)) = sync_account(State(ctx.state.clone()), Json(record)).await.unwrap();
    assert_eq!(code, StatusCode::OK);
    assert_eq!(resp.action, SyncAction::Unchanged);
}

#[tokio::test]
async fn test_sync_account_invalid_proxy() {
    let ctx = test_app_state(&[]).await;
    let mut proxy = proxy_at(ctx.proxy_port);
    proxy.proxy_type = Some("ftp".into());
    let record = AccountRecord::new("bad", "Bad", Some(proxy));

    let (code, _) = sync_account(State(ctx.state.clone()), Json(record)).await.unwrap_err();
    assert_eq!(code, StatusCode::BAD_REQUEST);
}
