//! # Warmpool Types
//!
//! Core types, models, and error definitions for the warmpool relay.
//!
//! - **`error`** - Typed error hierarchy for descriptors, transports and the registry
//! - **`models`** - Proxy descriptors, account records, configuration and status snapshots
//!
//! ## Architecture Role
//!
//! `warmpool-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        warmpool-types (this crate)
//!                │
//!                ▼
//!         warmpool-core
//!                │
//!                ▼
//!         warmpool-server
//! ```
//!
//! Nothing in this crate performs I/O. Every type is serde-serialisable so the
//! operator surface can expose it as JSON unchanged.

pub mod error;
pub mod models;

pub use error::{ConfigError, RegistryError, Result, TransportError, TypedError};

pub use models::{
    AccountRecord, ConnectionState, ConnectionStatus, DestroyReport, HealthCheckReport, IpFamily,
    LoggingConfig, ManagerStatus, MonitorConfig, MonitoringSummary, PerformanceSnapshot,
    PoolConnectionState, PoolSettings, PoolStats, PoolStatus, ProxyCredentials, ProxyDescriptor,
    ProxyEndpoint, ProxyKind, RawProxyConfig, RegistryStats, RegistryStatus, ServerConfig,
    ShutdownConfig, SlotRole, SlotStatus, WarmpoolConfig,
};
