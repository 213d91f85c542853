//! Service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use super::proxy::IpFamily;

/// Full warmpool configuration, loaded from `warmpool.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
pub struct WarmpoolConfig {
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolSettings,
    #[serde(default)]
    #[validate(nested)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    #[validate(nested)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default pre-warm target: a tiny, widely reachable endpoint
pub const DEFAULT_WARMUP_URL: &str = "https://www.gstatic.com/generate_204";

/// Per-pool agent settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct PoolSettings {
    /// Bound on a single pre-warm / reconnect attempt
    #[validate(range(min = 100_u64, max = 120_000_u64))]
    pub connect_timeout_ms: u64,
    /// Pre-warm sends a HEAD to this URL through the agent, leaving the
    /// tunnel in its idle pool. Point it at the relay's upstream origin so
    /// requests reuse that tunnel. `null` falls back to a bare TCP dial,
    /// which only proves the proxy is reachable.
    pub warmup_url: Option<String>,
    /// Local address family for proxy connections
    pub preferred_ip_family: IpFamily,
    /// Number of latency samples kept per slot
    #[validate(range(min = 1_usize, max = 1000_usize))]
    pub latency_history: usize,
    pub tcp_keepalive_secs: u64,
    pub pool_idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            warmup_url: Some(DEFAULT_WARMUP_URL.to_string()),
            preferred_ip_family: IpFamily::Ipv4,
            latency_history: 20,
            tcp_keepalive_secs: 60,
            pool_idle_timeout_secs: 90,
        }
    }
}

impl PoolSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Hybrid monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct MonitorConfig {
    /// Periodic health sweep (default: 300 = 5 minutes)
    #[validate(range(min = 1_u64, max = 86_400_u64))]
    pub health_check_interval_secs: u64,
    /// Periodic performance sweep (default: 30)
    #[validate(range(min = 1_u64, max = 86_400_u64))]
    pub performance_interval_secs: u64,
    /// Consecutive errors before `connection:critical` (default: 5)
    #[validate(range(min = 1_u32))]
    pub critical_error_threshold: u32,
    /// Unhealthy-pool fraction above which `health:degraded` fires (default: 0.2)
    #[validate(range(min = 0.0, max = 1.0))]
    pub degraded_ratio: f64,
    /// Broadcast channel capacity for monitor events
    #[validate(range(min = 1_usize))]
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 300,
            performance_interval_secs: 30,
            critical_error_threshold: 5,
            degraded_ratio: 0.2,
            event_capacity: 256,
        }
    }
}

impl MonitorConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn performance_interval(&self) -> Duration {
        Duration::from_secs(self.performance_interval_secs)
    }
}

/// Shutdown budget for `destroy_all`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Overall deadline
    #[validate(range(min = 1_u64))]
    pub timeout_ms: u64,
    /// Share of the deadline given to graceful per-pool closes
    #[validate(range(min = 0.0, max = 1.0))]
    pub graceful_ratio: f64,
    /// Upper bound on the graceful phase
    pub graceful_cap_ms: u64,
    /// Upper bound on one pool's graceful close
    pub per_pool_cap_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000, graceful_ratio: 0.75, graceful_cap_ms: 30_000, per_pool_cap_ms: 5_000 }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Operator HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    #[validate(range(min = 1_u16))]
    pub port: u16,
    /// Accounts file; relative paths resolve against the data directory
    pub accounts_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8046, accounts_file: "accounts.json".to_string() }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Directory for daily-rotated log files; stdout only when unset
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None }
    }
}
