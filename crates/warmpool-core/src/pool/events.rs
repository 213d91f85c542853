//! Lifecycle events emitted by pools.

use chrono::{DateTime, Utc};
use warmpool_types::SlotRole;

use crate::events::BusEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum PoolEventKind {
    /// First successful connect of a slot's agent
    Connected { role: SlotRole },
    /// A healthy slot's socket closed
    Disconnected { role: SlotRole },
    /// A slot's socket failed
    Error { role: SlotRole, message: String, consecutive_errors: u32 },
    /// A slot became healthy again after a failure
    Reconnected { role: SlotRole },
    /// The number of healthy slots changed
    StatusChanged { healthy_slots: usize, total_slots: usize },
    /// The active slot switched
    Failover { from: SlotRole, to: SlotRole },
}

#[derive(Debug, Clone)]
pub struct PoolEvent {
    pub account_id: String,
    pub kind: PoolEventKind,
    pub at: DateTime<Utc>,
}

impl PoolEvent {
    pub fn new(account_id: &str, kind: PoolEventKind) -> Self {
        Self { account_id: account_id.to_string(), kind, at: Utc::now() }
    }
}

impl BusEvent for PoolEvent {
    fn name(&self) -> &'static str {
        match self.kind {
            PoolEventKind::Connected { .. } => "pool:connected",
            PoolEventKind::Disconnected { .. } => "pool:disconnected",
            PoolEventKind::Error { .. } => "pool:error",
            PoolEventKind::Reconnected { .. } => "pool:reconnected",
            PoolEventKind::StatusChanged { .. } => "pool:status-changed",
            PoolEventKind::Failover { .. } => "pool:failover",
        }
    }
}
