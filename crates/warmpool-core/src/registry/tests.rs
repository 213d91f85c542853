use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use warmpool_types::{AccountRecord, PoolSettings, RegistryError, ShutdownConfig, SlotRole, TransportError};

use super::{PoolRegistry, SyncAction};
use crate::store::MemoryAccountStore;
use crate::testing::{descriptor, raw_proxy, MockDriver};

fn account(id: &str, host: &str) -> AccountRecord {
    AccountRecord::new(id, id.to_uppercase(), Some(raw_proxy(host, 1080)))
}

fn registry_with(accounts: Vec<AccountRecord>, driver: Arc<MockDriver>) -> PoolRegistry {
    PoolRegistry::new(
        Arc::new(MemoryAccountStore::new(accounts)),
        driver,
        PoolSettings::default(),
        ShutdownConfig::default(),
    )
}

async fn ready_registry(accounts: Vec<AccountRecord>) -> (PoolRegistry, Arc<MockDriver>) {
    let driver = Arc::new(MockDriver::new());
    let registry = registry_with(accounts, driver.clone());
    registry.initialize_all().await.unwrap();
    (registry, driver)
}

#[tokio::test]
async fn test_get_connection_before_initialize() {
    let registry = registry_with(vec![account("a", "p.local")], Arc::new(MockDriver::new()));

    let err = registry.get_connection("a").unwrap_err();
    assert_eq!(err, RegistryError::NotInitialized);
}

#[tokio::test]
async fn test_invalid_account_is_isolated() {
    let accounts = vec![
        account("a", "p1.local"),
        account("b", "p2.local"),
        account("c", "p3.local"),
        AccountRecord::new("bad", "Bad", Some(raw_proxy("p4.local", 70_000))),
    ];

    let (registry, _driver) = ready_registry(accounts).await;

    assert!(registry.is_initialized());
    assert_eq!(registry.pool_count(), 3);
    assert_eq!(registry.account_ids(), vec!["a", "b", "c"]);
    assert_eq!(registry.stats().failed_accounts, 1);
}

#[tokio::test]
async fn test_malformed_store_record_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "a", "proxy": {"type": "socks5", "host": "p1.local", "port": 1080}},
            {"id": "b", "proxy": {"type": "socks5", "host": "p2.local", "port": "1080"}},
            {"id": "c", "proxy": {"type": 5, "host": "p3.local", "port": 1080}},
            {"id": "d", "is_active": 1, "proxy": {"type": "socks5", "host": "p4.local", "port": 1080}}
        ]"#,
    )
    .unwrap();

    let registry = PoolRegistry::new(
        Arc::new(crate::store::JsonAccountStore::new(path)),
        Arc::new(MockDriver::new()),
        PoolSettings::default(),
        ShutdownConfig::default(),
    );
    let summary = registry.initialize_all().await.unwrap();

    assert!(registry.is_initialized());
    assert_eq!(registry.account_ids(), vec!["a", "b"]);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.initialized, 2);
    assert_eq!(summary.failed, 2);
    assert!(registry.get_connection("a").is_ok());
}

#[tokio::test]
async fn test_inactive_and_proxyless_accounts_are_skipped() {
    let mut inactive = account("off", "p.local");
    inactive.is_active = false;
    let accounts = vec![account("a", "p.local"), inactive, AccountRecord::new("direct", "Direct", None)];

    let driver = Arc::new(MockDriver::new());
    let registry = registry_with(accounts, driver);
    let summary = registry.initialize_all().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.initialized, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);
    assert!(matches!(registry.get_connection("off"), Err(RegistryError::NotFound { .. })));
}

#[tokio::test]
async fn test_initialize_all_twice_is_noop() {
    let (registry, driver) = ready_registry(vec![account("a", "p.local"), account("b", "p.local")]).await;
    let warms = driver.warms.load(Ordering::SeqCst);

    let summary = registry.initialize_all().await.unwrap();

    assert_eq!(summary.initialized, 2);
    assert_eq!(driver.warms.load(Ordering::SeqCst), warms);
    assert_eq!(registry.pool_count(), 2);
}

#[tokio::test]
async fn test_store_failure_leaves_registry_uninitialized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");
    std::fs::write(&path, "not json").unwrap();

    let registry = PoolRegistry::new(
        Arc::new(crate::store::JsonAccountStore::new(path)),
        Arc::new(MockDriver::new()),
        PoolSettings::default(),
        ShutdownConfig::default(),
    );

    assert!(matches!(registry.initialize_all().await, Err(RegistryError::Store { .. })));
    assert!(!registry.is_initialized());
}

#[tokio::test]
async fn test_unreachable_proxy_still_gets_a_pool() {
    let driver = Arc::new(MockDriver::new());
    driver.fail_host("down.local");
    let registry = registry_with(vec![account("a", "up.local"), account("b", "down.local")], driver);
    registry.initialize_all().await.unwrap();

    assert_eq!(registry.pool_count(), 2);
    let lease = registry.get_connection("b").unwrap();
    assert_eq!(lease.account_id(), "b");

    let report = registry.perform_health_check();
    assert_eq!(report.total, 2);
    assert_eq!(report.healthy, 1);
    assert_eq!(report.unhealthy_accounts, vec!["b"]);
}

#[tokio::test]
async fn test_get_connection_unknown_account() {
    let (registry, _driver) = ready_registry(vec![account("a", "p.local")]).await;

    let err = registry.get_connection("zzz").unwrap_err();
    assert_eq!(err, RegistryError::not_found("zzz"));
}

#[tokio::test]
async fn test_health_check_is_read_only() {
    let (registry, _driver) = ready_registry(vec![account("a", "p.local")]).await;
    let pool = registry.pools().remove(0);
    pool.mark_error(SlotRole::Primary, &TransportError::Closed);
    pool.mark_error(SlotRole::Secondary, &TransportError::Closed);

    let report = registry.perform_health_check();

    assert_eq!(report.unhealthy, 1);
    assert!((report.unhealthy_ratio() - 1.0).abs() < f64::EPSILON);
    assert_eq!(pool.healthy_slots(), 0);
    assert_eq!(pool.stats().request_count, 0);
}

#[tokio::test]
async fn test_add_and_remove() {
    let (registry, driver) = ready_registry(vec![]).await;

    let status = registry.add("new", descriptor("p.local")).await.unwrap();
    assert_eq!(status.connection_state.healthy_slots, 2);
    assert!(registry.get_connection("new").is_ok());

    assert!(registry.remove("new").await);
    assert!(!registry.remove("new").await);
    assert_eq!(driver.closes.load(Ordering::SeqCst), 2);
    assert!(matches!(registry.get_connection("new"), Err(RegistryError::NotFound { .. })));
}

#[tokio::test]
async fn test_sync_account_actions() {
    let (registry, _driver) = ready_registry(vec![]).await;

    let record = account("a", "p1.local");
    assert_eq!(registry.sync_account(&record).await.unwrap(), SyncAction::Added);
    assert_eq!(registry.sync_account(&record).await.unwrap(), SyncAction::Unchanged);

    let moved = account("a", "p2.local");
    assert_eq!(registry.sync_account(&moved).await.unwrap(), SyncAction::Replaced);
    assert_eq!(registry.get_status("a").unwrap().proxy, "socks5://p2.local:1080");

    let mut disabled = moved.clone();
    disabled.is_active = false;
    assert_eq!(registry.sync_account(&disabled).await.unwrap(), SyncAction::Removed);
    assert_eq!(registry.sync_account(&disabled).await.unwrap(), SyncAction::Unchanged);
}

#[tokio::test]
async fn test_sync_invalid_descriptor_removes_pool() {
    let (registry, _driver) = ready_registry(vec![account("a", "p.local")]).await;

    let broken = AccountRecord::new("a", "A", Some(raw_proxy("p.local", 0)));
    let err = registry.sync_account(&broken).await.unwrap_err();

    assert!(matches!(err, RegistryError::Config(_)));
    assert_eq!(registry.pool_count(), 0);
}

#[tokio::test]
async fn test_recreate_connection() {
    let (registry, driver) = ready_registry(vec![account("a", "p.local")]).await;

    let status = registry.recreate_connection("a").await.unwrap();
    assert_eq!(status.connection_state.healthy_slots, 2);
    assert_eq!(driver.warms.load(Ordering::SeqCst), 4);

    let err = registry.recreate_connection("missing").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { .. }));
}

#[tokio::test]
async fn test_all_status_shape() {
    let (registry, _driver) = ready_registry(vec![account("a", "p.local"), account("b", "p.local")]).await;
    registry.get_connection("a").unwrap();

    let status = registry.get_all_status();
    assert!(status.manager.is_initialized);
    assert_eq!(status.manager.total_pools, 2);
    assert_eq!(status.manager.stats.total_requests, 1);
    assert_eq!(status.manager.stats.healthy_pools, 2);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["manager"]["isInitialized"], true);
    assert_eq!(json["pools"][0]["accountId"], "a");
    assert!(json["pools"][0]["connectionState"].is_object());
    assert!(json["pools"][0]["stats"]["requestCount"].is_number());
}

#[tokio::test]
async fn test_destroy_all_within_budget() {
    let accounts = (0..5).map(|i| account(&format!("acc-{}", i), "p.local")).collect();
    let (registry, driver) = ready_registry(accounts).await;

    let report = registry.destroy_all(Duration::from_secs(2)).await;

    assert_eq!(report.total, 5);
    assert_eq!(report.completed, 5);
    assert_eq!(report.errors, 0);
    assert!(!report.timeout);
    assert_eq!(report.forced, 0);
    assert_eq!(driver.closes.load(Ordering::SeqCst), 10);
    assert_eq!(registry.pool_count(), 0);
    assert!(!registry.is_initialized());
    assert_eq!(registry.get_connection("acc-0").unwrap_err(), RegistryError::NotInitialized);
}

#[tokio::test]
async fn test_destroy_all_with_hung_sockets() {
    let accounts = (0..3).map(|i| account(&format!("acc-{}", i), "p.local")).collect();
    let driver = Arc::new(MockDriver::hanging());
    let registry = registry_with(accounts, driver);
    registry.initialize_all().await.unwrap();
    let pools = registry.pools();

    let started = Instant::now();
    let report = registry.destroy_all(Duration::from_millis(200)).await;

    assert!(report.timeout);
    assert_eq!(report.completed, 0);
    assert_eq!(report.forced, 3);
    assert!(started.elapsed() < Duration::from_millis(200 + 300));
    assert_eq!(registry.pool_count(), 0);
    assert!(pools.iter().all(|p| p.total_slots() == 0 && p.is_destroyed()));
}

#[tokio::test]
async fn test_destroy_all_empty_registry() {
    let registry = registry_with(vec![], Arc::new(MockDriver::new()));

    let report = registry.destroy_all(Duration::from_millis(100)).await;

    assert_eq!(report.total, 0);
    assert!(!report.timeout);
}

#[tokio::test]
async fn test_pool_events_reach_registry_subscribers() {
    let driver = Arc::new(MockDriver::new());
    let registry = registry_with(vec![account("a", "p.local")], driver);
    let mut rx = registry.subscribe();

    registry.initialize_all().await.unwrap();

    let events = rx.drain();
    assert!(events.iter().all(|e| e.account_id == "a"));
    assert!(events.len() >= 3);
}
