//! Operator-facing monitoring report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use warmpool_types::{
    ConnectionState, ConnectionStatus, HealthCheckReport, MonitorConfig, MonitoringSummary, PerformanceSnapshot,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringReport {
    pub is_running: bool,
    pub config: MonitorConfig,
    pub summary: MonitoringSummary,
    pub connections: Vec<ConnectionState>,
    pub last_health_check: Option<HealthCheckReport>,
    pub performance: Option<PerformanceSnapshot>,
    pub active_timers: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

pub(crate) fn summarize(connections: &[ConnectionState]) -> MonitoringSummary {
    let count = |status: ConnectionStatus| connections.iter().filter(|c| c.status == status).count();
    MonitoringSummary {
        accounts: connections.len(),
        connected: count(ConnectionStatus::Connected),
        degraded: count(ConnectionStatus::Degraded),
        disconnected: count(ConnectionStatus::Disconnected) + count(ConnectionStatus::Error),
        critical: count(ConnectionStatus::Critical),
    }
}
