//! Application State
//!
//! Shared handles to the pool registry and the hybrid monitor.

use std::sync::Arc;

use warmpool_core::{HybridMonitor, PoolRegistry};
use warmpool_types::WarmpoolConfig;

#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub registry: Arc<PoolRegistry>,
    pub monitor: Arc<HybridMonitor>,
    pub config: WarmpoolConfig,
}

impl AppState {
    pub fn new(registry: Arc<PoolRegistry>, monitor: Arc<HybridMonitor>, config: WarmpoolConfig) -> Self {
        Self { inner: Arc::new(AppStateInner { registry, monitor, config }) }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.inner.registry
    }

    pub fn monitor(&self) -> &Arc<HybridMonitor> {
        &self.inner.monitor
    }

    pub fn config(&self) -> &WarmpoolConfig {
        &self.inner.config
    }
}
