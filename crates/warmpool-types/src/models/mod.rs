//! Core domain models for warmpool.

mod account;
mod config;
mod proxy;
mod status;


pub use account::AccountRecord;
pub use config::{
    LoggingConfig, MonitorConfig, PoolSettings, ServerConfig, ShutdownConfig, WarmpoolConfig,
};
pub use proxy::{IpFamily, ProxyCredentials, ProxyDescriptor, ProxyEndpoint, ProxyKind, RawProxyConfig};
pub use status::{
    ConnectionState, ConnectionStatus, DestroyReport, HealthCheckReport, ManagerStatus,
    MonitoringSummary, PerformanceSnapshot, PoolConnectionState, PoolStats, PoolStatus,
    RegistryStats, RegistryStatus, SlotRole, SlotStatus,
};
