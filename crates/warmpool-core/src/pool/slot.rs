//! Per-slot health bookkeeping.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use warmpool_types::{SlotRole, SlotStatus};

use crate::agent::ProxyAgent;

/// What a successful connect changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectTransition {
    /// Already healthy: no event
    Unchanged,
    /// First successful connect of this agent
    Connected,
    /// Healthy again after an error or close
    Reconnected,
}

pub(crate) struct Slot {
    pub(crate) agent: Arc<ProxyAgent>,
    pub(crate) health: SlotHealth,
}

impl Slot {
    pub(crate) fn new(agent: Arc<ProxyAgent>, latency_capacity: usize) -> Self {
        Self { agent, health: SlotHealth::new(latency_capacity) }
    }

    pub(crate) fn status(&self, role: SlotRole) -> SlotStatus {
        let now = Instant::now();
        SlotStatus {
            role,
            healthy: self.health.healthy,
            last_error: self.health.last_error.clone(),
            consecutive_errors: self.health.consecutive_errors,
            age_secs: now.duration_since(self.health.created_at).as_secs(),
            idle_secs: now.duration_since(self.health.last_used_at).as_secs(),
            avg_latency_ms: self.health.avg_latency().map(|d| d.as_secs_f64() * 1000.0),
        }
    }
}

pub(crate) struct SlotHealth {
    healthy: bool,
    has_failed: bool,
    last_error: Option<String>,
    consecutive_errors: u32,
    created_at: Instant,
    last_used_at: Instant,
    latencies: VecDeque<Duration>,
    latency_capacity: usize,
}

impl SlotHealth {
    fn new(latency_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            healthy: false,
            has_failed: false,
            last_error: None,
            consecutive_errors: 0,
            created_at: now,
            last_used_at: now,
            latencies: VecDeque::with_capacity(latency_capacity),
            latency_capacity: latency_capacity.max(1),
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub(crate) fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub(crate) fn mark_connected(&mut self) -> ConnectTransition {
        if self.healthy {
            return ConnectTransition::Unchanged;
        }
        self.healthy = true;
        self.consecutive_errors = 0;
        if self.has_failed {
            ConnectTransition::Reconnected
        } else {
            ConnectTransition::Connected
        }
    }

    /// Returns the new consecutive error count.
    pub(crate) fn mark_error(&mut self, message: String) -> u32 {
        self.healthy = false;
        self.has_failed = true;
        self.last_error = Some(message);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }

    /// Returns whether the slot was healthy before the close.
    pub(crate) fn mark_closed(&mut self) -> bool {
        let was_healthy = self.healthy;
        self.healthy = false;
        self.has_failed = true;
        was_healthy
    }

    pub(crate) fn record_latency(&mut self, latency: Duration) {
        self.latencies.push_back(latency);
        while self.latencies.len() > self.latency_capacity {
            self.latencies.pop_front();
        }
    }

    pub(crate) fn avg_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used_at = now;
    }
}
