//! Status snapshots exposed on the operator surface.
//!
//! Field names follow the operator JSON contract (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of a pool's two agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotRole {
    Primary,
    Secondary,
}

impl SlotRole {
    pub fn other(self) -> Self {
        match self {
            SlotRole::Primary => SlotRole::Secondary,
            SlotRole::Secondary => SlotRole::Primary,
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRole::Primary => write!(f, "primary"),
            SlotRole::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub role: SlotRole,
    pub healthy: bool,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
    pub age_secs: u64,
    pub idle_secs: u64,
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub request_count: u64,
    pub error_count: u64,
    pub failover_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolConnectionState {
    pub healthy_slots: usize,
    pub total_slots: usize,
    pub primary: Option<SlotStatus>,
    pub secondary: Option<SlotStatus>,
}

/// Snapshot of one account's pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub account_id: String,
    /// Redacted proxy URI
    pub proxy: String,
    pub active_role: SlotRole,
    pub connection_state: PoolConnectionState,
    pub stats: PoolStats,
    pub idle_secs: u64,
}

impl PoolStatus {
    pub fn is_healthy(&self) -> bool {
        self.connection_state.healthy_slots > 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_failovers: u64,
    pub healthy_pools: usize,
    pub unhealthy_pools: usize,
    /// Accounts skipped or failed during the last initialization sweep
    pub failed_accounts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub is_initialized: bool,
    pub total_pools: usize,
    pub stats: RegistryStats,
}

/// `{manager:{isInitialized,totalPools,stats}, pools:[...]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryStatus {
    pub manager: ManagerStatus,
    pub pools: Vec<PoolStatus>,
}

/// Result of a read-only health sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckReport {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unhealthy_accounts: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckReport {
    /// Fraction of pools with no healthy slot; 0 for an empty registry.
    pub fn unhealthy_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unhealthy as f64 / self.total as f64
        }
    }
}

/// Outcome of `destroy_all`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestroyReport {
    pub total: usize,
    /// Pools whose graceful close finished within budget
    pub completed: usize,
    /// Pools whose close failed or exceeded their own budget
    pub errors: usize,
    /// The overall deadline fired before every close finished
    pub timeout: bool,
    /// Pools dropped without a finished close
    pub forced: usize,
    pub elapsed_ms: u64,
}

/// Cached per-account connection status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Connected,
    Degraded,
    Disconnected,
    Error,
    Critical,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Unknown => "unknown",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Degraded => "degraded",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Derived, never-authoritative view of one account's connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub account_id: String,
    pub status: ConnectionStatus,
    pub healthy_connections: usize,
    pub total_connections: usize,
    pub consecutive_errors: u32,
    pub last_error_message: Option<String>,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub last_reconnected: Option<DateTime<Utc>>,
}

impl ConnectionState {
    pub fn new(account_id: &str) -> Self {
        Self { account_id: account_id.to_string(), ..Default::default() }
    }
}

/// Aggregate produced by the performance sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub total_pools: usize,
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub avg_latency_ms: Option<f64>,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_failovers: u64,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSummary {
    pub accounts: usize,
    pub connected: usize,
    pub degraded: usize,
    pub disconnected: usize,
    pub critical: usize,
}
