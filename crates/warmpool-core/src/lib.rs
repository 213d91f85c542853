//! # Warmpool Core
//!
//! Keeps a pre-warmed pair of proxy connections per tenant account and hands
//! the relay layer a working one in bounded time.
//!
//! ```text
//! warmpool-core/src/
//! ├── agent/      # ProxyAgentFactory + ConnectionDriver (warm / close)
//! ├── pool/       # ConnectionPool: primary/secondary slots, failover, leases
//! ├── registry/   # PoolRegistry: one pool per account, bounded shutdown
//! ├── monitor/    # HybridMonitor: event-driven cache + periodic sweeps
//! ├── events.rs   # broadcast EventBus
//! ├── timers.rs   # cancellable named timers
//! ├── store.rs    # account store trait + JSON / in-memory stores
//! ├── config.rs   # warmpool.json loading
//! └── logger.rs   # tracing subscriber setup
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Lock guards are scoped explicitly around slot mutation"
)]
#![cfg_attr(test, allow(clippy::panic, clippy::float_cmp, clippy::unwrap_used))]

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod store;
pub mod timers;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{AgentOptions, ConnectionDriver, ProxyAgent, ProxyAgentFactory, TunnelDriver};
pub use error::{AppError, AppResult};
pub use events::{BusEvent, EventBus, EventReceiver};
pub use monitor::{HybridMonitor, MonitorEvent, MonitoringReport};
pub use pool::{AgentLease, ConnectionPool, PoolEvent, PoolEventKind};
pub use registry::{InitSummary, PoolRegistry, SyncAction};
pub use store::{AccountListing, AccountStore, JsonAccountStore, MemoryAccountStore, RejectedRecord};
pub use timers::TimerRegistry;
