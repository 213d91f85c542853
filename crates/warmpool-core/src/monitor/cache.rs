//! Derived per-account connection state.
//!
//! Every update runs under the entry's shard lock, so readers never observe a
//! half-applied event.

use chrono::Utc;
use dashmap::DashMap;
use warmpool_types::{ConnectionState, ConnectionStatus, PoolStatus};

use super::events::MonitorEvent;
use crate::pool::{PoolEvent, PoolEventKind};

#[derive(Default)]
pub(crate) struct ConnectionCache {
    entries: DashMap<String, ConnectionState>,
}

impl ConnectionCache {
    /// Fold one pool event into the cache and return the events to re-emit.
    pub(crate) fn apply(&self, event: &PoolEvent, critical_threshold: u32) -> Vec<MonitorEvent> {
        let account_id = event.account_id.clone();
        let mut entry = self
            .entries
            .entry(account_id.clone())
            .or_insert_with(|| ConnectionState::new(&account_id));
        let state = entry.value_mut();
        let mut emitted = Vec::new();

        match &event.kind {
            PoolEventKind::Connected { role } => {
                state.last_connected = Some(event.at);
                state.consecutive_errors = 0;
                emitted.push(MonitorEvent::ConnectionEstablished { account_id, role: *role });
            },
            PoolEventKind::Reconnected { role } => {
                state.last_reconnected = Some(event.at);
                state.consecutive_errors = 0;
                emitted.push(MonitorEvent::ConnectionRecovered { account_id, role: *role });
            },
            PoolEventKind::Disconnected { role } => {
                state.last_disconnected = Some(event.at);
                emitted.push(MonitorEvent::ConnectionLost { account_id, role: *role });
            },
            PoolEventKind::Error { role, message, .. } => {
                state.consecutive_errors = state.consecutive_errors.saturating_add(1);
                state.last_error = Some(event.at);
                state.last_error_message = Some(message.clone());
                emitted.push(MonitorEvent::ConnectionError {
                    account_id: account_id.clone(),
                    role: *role,
                    message: message.clone(),
                    consecutive_errors: state.consecutive_errors,
                });
                if state.consecutive_errors == critical_threshold {
                    emitted.push(MonitorEvent::ConnectionCritical {
                        account_id,
                        consecutive_errors: state.consecutive_errors,
                        last_error: state.last_error_message.clone(),
                    });
                }
            },
            PoolEventKind::StatusChanged { healthy_slots, total_slots } => {
                state.healthy_connections = *healthy_slots;
                state.total_connections = *total_slots;
                state.status = derive_status(state, critical_threshold);
                emitted.push(MonitorEvent::PoolStatusChanged {
                    account_id,
                    status: state.status,
                    healthy_connections: *healthy_slots,
                    total_connections: *total_slots,
                });
            },
            PoolEventKind::Failover { .. } => {},
        }

        state.status = derive_status(state, critical_threshold);
        emitted
    }

    /// Reconcile with an authoritative pool snapshot.
    ///
    /// Returns a status-change event when the counts had drifted, which is
    /// how a missed socket event gets noticed.
    pub(crate) fn reconcile(&self, pool: &PoolStatus, critical_threshold: u32) -> Option<MonitorEvent> {
        let mut entry = self
            .entries
            .entry(pool.account_id.clone())
            .or_insert_with(|| ConnectionState::new(&pool.account_id));
        let state = entry.value_mut();

        let healthy = pool.connection_state.healthy_slots;
        let total = pool.connection_state.total_slots;
        let drifted = state.healthy_connections != healthy || state.total_connections != total;

        state.healthy_connections = healthy;
        state.total_connections = total;
        if healthy > 0 && state.last_connected.is_none() {
            state.last_connected = Some(Utc::now());
        }
        state.status = derive_status(state, critical_threshold);

        drifted.then(|| MonitorEvent::PoolStatusChanged {
            account_id: pool.account_id.clone(),
            status: state.status,
            healthy_connections: healthy,
            total_connections: total,
        })
    }

    pub(crate) fn get(&self, account_id: &str) -> Option<ConnectionState> {
        self.entries.get(account_id).map(|entry| entry.value().clone())
    }

    /// All entries, sorted by account id.
    pub(crate) fn snapshot(&self) -> Vec<ConnectionState> {
        let mut states: Vec<ConnectionState> = self.entries.iter().map(|entry| entry.value().clone()).collect();
        states.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        states
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

fn derive_status(state: &ConnectionState, critical_threshold: u32) -> ConnectionStatus {
    if state.consecutive_errors >= critical_threshold {
        return ConnectionStatus::Critical;
    }
    match (state.healthy_connections, state.total_connections) {
        (healthy, total) if total > 0 && healthy == total => ConnectionStatus::Connected,
        (healthy, _) if healthy > 0 => ConnectionStatus::Degraded,
        (_, total) if total > 0 && state.consecutive_errors > 0 => ConnectionStatus::Error,
        (_, total) if total > 0 => ConnectionStatus::Disconnected,
        _ if state.last_connected.is_some() || state.last_error.is_some() || state.last_disconnected.is_some() => {
            ConnectionStatus::Disconnected
        },
        _ => ConnectionStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warmpool_types::SlotRole;

    fn event(kind: PoolEventKind) -> PoolEvent {
        PoolEvent::new("acc", kind)
    }

    fn error() -> PoolEvent {
        event(PoolEventKind::Error { role: SlotRole::Primary, message: "reset".into(), consecutive_errors: 1 })
    }

    #[test]
    fn test_status_follows_slot_counts() {
        let cache = ConnectionCache::default();

        cache.apply(&event(PoolEventKind::StatusChanged { healthy_slots: 2, total_slots: 2 }), 5);
        assert_eq!(cache.get("acc").unwrap().status, ConnectionStatus::Connected);

        cache.apply(&event(PoolEventKind::StatusChanged { healthy_slots: 1, total_slots: 2 }), 5);
        assert_eq!(cache.get("acc").unwrap().status, ConnectionStatus::Degraded);

        cache.apply(&error(), 5);
        cache.apply(&event(PoolEventKind::StatusChanged { healthy_slots: 0, total_slots: 2 }), 5);
        assert_eq!(cache.get("acc").unwrap().status, ConnectionStatus::Error);

        cache.apply(&event(PoolEventKind::StatusChanged { healthy_slots: 0, total_slots: 0 }), 5);
        assert_eq!(cache.get("acc").unwrap().status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_critical_fires_once_at_threshold() {
        let cache = ConnectionCache::default();

        let critical: usize = (0..7)
            .map(|_| {
                cache
                    .apply(&error(), 5)
                    .iter()
                    .filter(|e| matches!(e, MonitorEvent::ConnectionCritical { .. }))
                    .count()
            })
            .sum();

        assert_eq!(critical, 1);
        let state = cache.get("acc").unwrap();
        assert_eq!(state.consecutive_errors, 7);
        assert_eq!(state.status, ConnectionStatus::Critical);
        assert_eq!(state.last_error_message.as_deref(), Some("reset"));
    }

    #[test]
    fn test_reconcile_reports_drift_only() {
        let cache = ConnectionCache::default();
        cache.apply(&event(PoolEventKind::StatusChanged { healthy_slots: 2, total_slots: 2 }), 5);

        let mut status = PoolStatus {
            account_id: "acc".into(),
            proxy: "socks5://p:1080".into(),
            active_role: SlotRole::Primary,
            connection_state: warmpool_types::PoolConnectionState {
                healthy_slots: 2,
                total_slots: 2,
                primary: None,
                secondary: None,
            },
            stats: warmpool_types::PoolStats::default(),
            idle_secs: 0,
        };
        assert!(cache.reconcile(&status, 5).is_none());

        status.connection_state.healthy_slots = 0;
        let drift = cache.reconcile(&status, 5).unwrap();
        assert!(matches!(
            drift,
            MonitorEvent::PoolStatusChanged { status: ConnectionStatus::Disconnected, healthy_connections: 0, .. }
        ));
    }
}
