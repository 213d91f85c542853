//! Global owner of one connection pool per account.
//!
//! The registry is an explicit instance owned by process bootstrap. All pools
//! publish on the registry's event bus, which is what the monitor listens to.

mod shutdown;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use warmpool_types::{
    AccountRecord, HealthCheckReport, ManagerStatus, PoolSettings, PoolStatus, ProxyDescriptor,
    RegistryError, RegistryStats, RegistryStatus, ShutdownConfig, WarmpoolConfig,
};

use crate::agent::ConnectionDriver;
use crate::events::{EventBus, EventReceiver};
use crate::pool::{AgentLease, ConnectionPool, PoolEvent};
use crate::store::AccountStore;

pub use shutdown::ShutdownBudget;

/// Outcome of one `initialize_all` sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSummary {
    /// Records returned by the store
    pub total: usize,
    pub initialized: usize,
    /// Inactive or proxy-less accounts
    pub skipped: usize,
    /// Unreadable records, invalid descriptors and failed pool builds
    pub failed: usize,
}

/// What `sync_account` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Added,
    Replaced,
    Removed,
    Unchanged,
}

pub struct PoolRegistry {
    pools: DashMap<String, ConnectionPool>,
    initialized: AtomicBool,
    /// Bumped on every full reset (`destroy_all`)
    generation: AtomicU64,
    /// Serializes initialization sweeps
    init_lock: tokio::sync::Mutex<()>,
    last_summary: parking_lot::Mutex<InitSummary>,
    failed_accounts: AtomicUsize,
    settings: PoolSettings,
    shutdown: ShutdownConfig,
    driver: Arc<dyn ConnectionDriver>,
    store: Arc<dyn AccountStore>,
    events: EventBus<PoolEvent>,
}

impl PoolRegistry {
    pub fn new(
        store: Arc<dyn AccountStore>,
        driver: Arc<dyn ConnectionDriver>,
        settings: PoolSettings,
        shutdown: ShutdownConfig,
    ) -> Self {
        Self::with_events(store, driver, settings, shutdown, EventBus::new())
    }

    pub fn from_config(
        store: Arc<dyn AccountStore>,
        driver: Arc<dyn ConnectionDriver>,
        config: &WarmpoolConfig,
    ) -> Self {
        Self::with_events(
            store,
            driver,
            config.pool.clone(),
            config.shutdown.clone(),
            EventBus::with_capacity(config.monitor.event_capacity),
        )
    }

    fn with_events(
        store: Arc<dyn AccountStore>,
        driver: Arc<dyn ConnectionDriver>,
        settings: PoolSettings,
        shutdown: ShutdownConfig,
        events: EventBus<PoolEvent>,
    ) -> Self {
        Self {
            pools: DashMap::new(),
            initialized: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            init_lock: tokio::sync::Mutex::new(()),
            last_summary: parking_lot::Mutex::new(InitSummary::default()),
            failed_accounts: AtomicUsize::new(0),
            settings,
            shutdown,
            driver,
            store,
            events,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Number of full resets so far. Derived state keyed by account should be
    /// discarded when this moves.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus<PoolEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> EventReceiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn shutdown_config(&self) -> &ShutdownConfig {
        &self.shutdown
    }

    fn new_pool(&self, account_id: &str, descriptor: ProxyDescriptor) -> ConnectionPool {
        ConnectionPool::new(
            account_id,
            descriptor,
            &self.settings,
            Arc::clone(&self.driver),
            self.events.clone(),
        )
    }

    fn pool(&self, account_id: &str) -> Option<ConnectionPool> {
        self.pools.get(account_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every pool. Clones share state with the registry's copies.
    pub fn pools(&self) -> Vec<ConnectionPool> {
        self.pools.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Insert a pool, destroying whatever it replaced in the background.
    fn install(&self, pool: ConnectionPool) -> bool {
        let account_id = pool.account_id().to_string();
        match self.pools.insert(account_id, pool) {
            Some(old) => {
                self.retire(old);
                true
            },
            None => false,
        }
    }

    fn retire(&self, pool: ConnectionPool) {
        let budget = ShutdownBudget::new(&self.shutdown, self.shutdown.timeout());
        tokio::spawn(async move {
            match tokio::time::timeout(budget.per_pool, pool.destroy()).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!(account_id = %pool.account_id(), error = %e, "Retired pool closed with error"),
                Err(_) => {
                    warn!(account_id = %pool.account_id(), "Retired pool close timed out");
                    pool.force_release();
                },
            }
        });
    }

    /// Build one pool per active account with a valid proxy.
    ///
    /// Per-account failures are logged and counted, never propagated. Only a
    /// store read failure aborts the sweep. Once a sweep has completed, later
    /// calls return the previous summary without side effects.
    pub async fn initialize_all(&self) -> Result<InitSummary, RegistryError> {
        let _sweep = self.init_lock.lock().await;
        if self.is_initialized() {
            info!("Pool registry already initialized, skipping");
            return Ok(self.last_summary.lock().clone());
        }

        let listing = self.store.load_accounts().await?;
        let mut summary = InitSummary { total: listing.total(), ..InitSummary::default() };
        info!(accounts = summary.total, "Initializing connection pools");

        for rejected in &listing.rejected {
            warn!(
                index = rejected.index,
                account_id = ?rejected.id,
                error = %rejected.error,
                "Unreadable account record, skipping"
            );
            summary.failed += 1;
        }
        let accounts = listing.accounts;

        let mut join_set: JoinSet<(ConnectionPool, Result<(), RegistryError>)> = JoinSet::new();

        for account in accounts {
            if !account.is_active {
                debug!(account_id = %account.id, "Skipping inactive account");
                summary.skipped += 1;
                continue;
            }

            let descriptor = match account.descriptor() {
                Ok(Some(descriptor)) => descriptor,
                Ok(None) => {
                    info!(account_id = %account.id, name = %account.name, "Skipping account without proxy");
                    summary.skipped += 1;
                    continue;
                },
                Err(e) => {
                    warn!(account_id = %account.id, error = %e, "Invalid proxy descriptor, skipping account");
                    summary.failed += 1;
                    continue;
                },
            };

            let pool = self.new_pool(&account.id, descriptor);
            join_set.spawn(async move {
                let result = pool.initialize().await;
                (pool, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((pool, Ok(()))) => {
                    self.install(pool);
                    summary.initialized += 1;
                },
                Ok((pool, Err(e))) => {
                    warn!(account_id = %pool.account_id(), error = %e, "Failed to initialize pool");
                    summary.failed += 1;
                },
                Err(e) => {
                    error!(error = %e, "Pool initialization task panicked");
                    summary.failed += 1;
                },
            }
        }

        self.failed_accounts.store(summary.skipped + summary.failed, Ordering::SeqCst);
        *self.last_summary.lock() = summary.clone();
        self.initialized.store(true, Ordering::SeqCst);

        if summary.initialized == 0 && summary.failed > 0 {
            error!(failed = summary.failed, "No connection pool could be initialized");
        }
        info!(
            total = summary.total,
            initialized = summary.initialized,
            skipped = summary.skipped,
            failed = summary.failed,
            "Connection pools initialized"
        );
        Ok(summary)
    }

    /// Lease a slot for the account. Never waits on the network.
    pub fn get_connection(&self, account_id: &str) -> Result<AgentLease, RegistryError> {
        if !self.is_initialized() {
            return Err(RegistryError::NotInitialized);
        }
        self.pool(account_id)
            .and_then(|pool| pool.get_connection())
            .ok_or_else(|| RegistryError::not_found(account_id))
    }

    /// Build, warm and register a pool, replacing any existing one.
    pub async fn add(&self, account_id: &str, descriptor: ProxyDescriptor) -> Result<PoolStatus, RegistryError> {
        let pool = self.new_pool(account_id, descriptor);
        pool.initialize().await?;
        let status = pool.get_status();
        let replaced = self.install(pool);
        info!(account_id, replaced, healthy_slots = status.connection_state.healthy_slots, "Pool added");
        Ok(status)
    }

    /// Destroy and unregister the account's pool. Returns whether one existed.
    pub async fn remove(&self, account_id: &str) -> bool {
        let Some((_, pool)) = self.pools.remove(account_id) else {
            return false;
        };
        let budget = ShutdownBudget::new(&self.shutdown, self.shutdown.timeout());
        match tokio::time::timeout(budget.per_pool, pool.destroy()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(account_id, error = %e, "Pool close failed during removal"),
            Err(_) => {
                warn!(account_id, "Pool close timed out during removal");
                pool.force_release();
            },
        }
        info!(account_id, "Pool removed");
        true
    }

    /// Apply an account-store change.
    ///
    /// An invalid descriptor removes the existing pool and returns the error.
    pub async fn sync_account(&self, account: &AccountRecord) -> Result<SyncAction, RegistryError> {
        let descriptor = if account.is_active {
            match account.descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    self.remove(&account.id).await;
                    return Err(e.into());
                },
            }
        } else {
            None
        };

        let Some(descriptor) = descriptor else {
            let removed = self.remove(&account.id).await;
            return Ok(if removed { SyncAction::Removed } else { SyncAction::Unchanged });
        };

        let existing = self.pool(&account.id);
        if existing.as_ref().is_some_and(|pool| pool.descriptor() == &descriptor) {
            return Ok(SyncAction::Unchanged);
        }

        self.add(&account.id, descriptor).await?;
        Ok(if existing.is_some() { SyncAction::Replaced } else { SyncAction::Added })
    }

    /// Rebuild one pool's agents from its descriptor.
    pub async fn recreate_connection(&self, account_id: &str) -> Result<PoolStatus, RegistryError> {
        let pool = self.pool(account_id).ok_or_else(|| RegistryError::not_found(account_id))?;
        info!(account_id, "Recreating pool connections");
        pool.recreate().await
    }

    /// Classify every pool as healthy (at least one healthy slot) or not.
    /// Read-only.
    pub fn perform_health_check(&self) -> HealthCheckReport {
        let mut unhealthy_accounts = Vec::new();
        let mut total = 0;
        for entry in &self.pools {
            total += 1;
            if !entry.value().is_healthy() {
                unhealthy_accounts.push(entry.key().clone());
            }
        }
        unhealthy_accounts.sort();

        let unhealthy = unhealthy_accounts.len();
        let report = HealthCheckReport {
            total,
            healthy: total - unhealthy,
            unhealthy,
            unhealthy_accounts,
            checked_at: Utc::now(),
        };
        debug!(total, healthy = report.healthy, unhealthy, "Health check complete");
        report
    }

    pub fn get_status(&self, account_id: &str) -> Option<PoolStatus> {
        self.pool(account_id).map(|pool| pool.get_status())
    }

    pub fn get_all_status(&self) -> RegistryStatus {
        let mut pools: Vec<PoolStatus> = self.pools.iter().map(|entry| entry.value().get_status()).collect();
        pools.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        let stats = self.aggregate(&pools);

        RegistryStatus {
            manager: ManagerStatus {
                is_initialized: self.is_initialized(),
                total_pools: pools.len(),
                stats,
            },
            pools,
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let pools: Vec<PoolStatus> = self.pools.iter().map(|entry| entry.value().get_status()).collect();
        self.aggregate(&pools)
    }

    fn aggregate(&self, pools: &[PoolStatus]) -> RegistryStats {
        let healthy_pools = pools.iter().filter(|p| p.is_healthy()).count();
        RegistryStats {
            total_requests: pools.iter().map(|p| p.stats.request_count).sum(),
            total_errors: pools.iter().map(|p| p.stats.error_count).sum(),
            total_failovers: pools.iter().map(|p| p.stats.failover_count).sum(),
            healthy_pools,
            unhealthy_pools: pools.len() - healthy_pools,
            failed_accounts: self.failed_accounts.load(Ordering::SeqCst),
        }
    }
}
