//! Coarse events re-emitted by the monitor.

use serde::Serialize;
use warmpool_types::{ConnectionStatus, HealthCheckReport, SlotRole};

use crate::events::BusEvent;

/// What alerting and lifecycle collaborators subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    ConnectionEstablished { account_id: String, role: SlotRole },
    ConnectionLost { account_id: String, role: SlotRole },
    ConnectionError { account_id: String, role: SlotRole, message: String, consecutive_errors: u32 },
    ConnectionRecovered { account_id: String, role: SlotRole },
    /// Consecutive errors reached the critical threshold
    ConnectionCritical { account_id: String, consecutive_errors: u32, last_error: Option<String> },
    PoolStatusChanged {
        account_id: String,
        status: ConnectionStatus,
        healthy_connections: usize,
        total_connections: usize,
    },
    /// Unhealthy-pool fraction crossed the configured ratio
    HealthDegraded { unhealthy_ratio: f64, report: HealthCheckReport },
}

impl MonitorEvent {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::ConnectionEstablished { account_id, .. }
            | Self::ConnectionLost { account_id, .. }
            | Self::ConnectionError { account_id, .. }
            | Self::ConnectionRecovered { account_id, .. }
            | Self::ConnectionCritical { account_id, .. }
            | Self::PoolStatusChanged { account_id, .. } => Some(account_id),
            Self::HealthDegraded { .. } => None,
        }
    }
}

impl BusEvent for MonitorEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection:established",
            Self::ConnectionLost { .. } => "connection:lost",
            Self::ConnectionError { .. } => "connection:error",
            Self::ConnectionRecovered { .. } => "connection:recovered",
            Self::ConnectionCritical { .. } => "connection:critical",
            Self::PoolStatusChanged { .. } => "pool:status:changed",
            Self::HealthDegraded { .. } => "health:degraded",
        }
    }
}
