//! Per-account connection pool.
//!
//! A pool owns two agents built from one descriptor. Slot selection happens
//! under a short `parking_lot` mutex with no I/O inside; warming and closing
//! run outside it. Events are emitted after the lock is released.

mod events;
mod lease;
mod slot;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use warmpool_types::{
    PoolConnectionState, PoolSettings, PoolStats, PoolStatus, ProxyDescriptor, RegistryError, SlotRole,
    TransportError,
};

use crate::agent::{AgentOptions, ConnectionDriver, ProxyAgent, ProxyAgentFactory};
use crate::events::EventBus;

pub use events::{PoolEvent, PoolEventKind};
pub use lease::AgentLease;

use slot::{ConnectTransition, Slot};

/// Primary/secondary pair for one account.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    account_id: String,
    descriptor: ProxyDescriptor,
    options: AgentOptions,
    latency_history: usize,
    driver: Arc<dyn ConnectionDriver>,
    events: EventBus<PoolEvent>,
    state: Mutex<PoolState>,
    /// Serializes initialize / recreate
    lifecycle: tokio::sync::Mutex<()>,
    destroyed: AtomicBool,
}

struct PoolState {
    primary: Option<Slot>,
    secondary: Option<Slot>,
    active: SlotRole,
    stats: PoolStats,
    last_used_at: Instant,
    /// (healthy, total) last announced through `StatusChanged`
    reported: (usize, usize),
}

impl PoolState {
    fn new() -> Self {
        Self {
            primary: None,
            secondary: None,
            active: SlotRole::Primary,
            stats: PoolStats::default(),
            last_used_at: Instant::now(),
            reported: (0, 0),
        }
    }

    fn slot(&self, role: SlotRole) -> Option<&Slot> {
        match role {
            SlotRole::Primary => self.primary.as_ref(),
            SlotRole::Secondary => self.secondary.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: SlotRole) -> Option<&mut Slot> {
        match role {
            SlotRole::Primary => self.primary.as_mut(),
            SlotRole::Secondary => self.secondary.as_mut(),
        }
    }

    fn set_slot(&mut self, role: SlotRole, slot: Option<Slot>) -> Option<Slot> {
        match role {
            SlotRole::Primary => std::mem::replace(&mut self.primary, slot),
            SlotRole::Secondary => std::mem::replace(&mut self.secondary, slot),
        }
    }

    /// Slot for `role`, provided it still holds the agent `agent_id`.
    fn slot_for(&mut self, role: SlotRole, agent_id: Option<u64>) -> Option<&mut Slot> {
        let slot = self.slot_mut(role)?;
        match agent_id {
            Some(id) if slot.agent.id() != id => None,
            _ => Some(slot),
        }
    }

    fn healthy_slots(&self) -> usize {
        [&self.primary, &self.secondary]
            .into_iter()
            .flatten()
            .filter(|s| s.health.is_healthy())
            .count()
    }

    fn total_slots(&self) -> usize {
        usize::from(self.primary.is_some()) + usize::from(self.secondary.is_some())
    }

    fn take_agents(&mut self) -> Vec<Arc<ProxyAgent>> {
        [self.primary.take(), self.secondary.take()]
            .into_iter()
            .flatten()
            .map(|s| s.agent)
            .collect()
    }

    fn status_change(&mut self) -> Option<PoolEventKind> {
        let current = (self.healthy_slots(), self.total_slots());
        if current == self.reported {
            return None;
        }
        self.reported = current;
        let (healthy_slots, total_slots) = current;
        Some(PoolEventKind::StatusChanged { healthy_slots, total_slots })
    }
}

/// Releases agents on drop, so a cancelled or failed close still frees them.
struct ReleaseGuard(Vec<Arc<ProxyAgent>>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        for agent in &self.0 {
            agent.release();
        }
    }
}

impl ConnectionPool {
    pub fn new(
        account_id: impl Into<String>,
        descriptor: ProxyDescriptor,
        settings: &PoolSettings,
        driver: Arc<dyn ConnectionDriver>,
        events: EventBus<PoolEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                account_id: account_id.into(),
                descriptor,
                options: AgentOptions::from(settings),
                latency_history: settings.latency_history,
                driver,
                events,
                state: Mutex::new(PoolState::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn account_id(&self) -> &str {
        self.inner.account_id()
    }

    pub fn descriptor(&self) -> &ProxyDescriptor {
        &self.inner.descriptor
    }

    /// Build both agents and pre-warm them.
    ///
    /// Fails on a descriptor the factory rejects (`Config`) or a pool that has
    /// been destroyed (`NotFound`). A failed warm leaves the slot unhealthy
    /// and the pool usable. Calling again is a no-op.
    pub async fn initialize(&self) -> Result<(), RegistryError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.state.lock().total_slots() > 0 {
            debug!(account_id = %self.account_id(), "Pool already initialized");
            return Ok(());
        }

        self.inner.install_pair(false).await?;

        info!(
            account_id = %self.account_id(),
            proxy = %self.inner.descriptor,
            healthy_slots = self.healthy_slots(),
            "Connection pool initialized"
        );
        Ok(())
    }

    /// Pick the slot for the next outbound call. Never waits on I/O.
    ///
    /// Returns `None` only when the pool has no slots (not initialized or
    /// destroyed).
    pub fn get_connection(&self) -> Option<AgentLease> {
        if self.is_destroyed() {
            return None;
        }

        let mut failover = None;
        let (role, agent) = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            state.stats.request_count += 1;
            state.last_used_at = now;

            let active = state.active;
            let other = active.other();
            let active_healthy = state.slot(active).is_some_and(|s| s.health.is_healthy());
            if !active_healthy {
                if state.slot(other).is_some_and(|s| s.health.is_healthy()) {
                    state.active = other;
                    state.stats.failover_count += 1;
                    failover = Some(PoolEventKind::Failover { from: active, to: other });
                } else if state.slot(active).is_none() && state.slot(other).is_some() {
                    state.active = other;
                }
            }

            let role = state.active;
            let slot = state.slot_mut(role)?;
            slot.health.touch(now);
            (role, Arc::clone(&slot.agent))
        };

        if let Some(kind) = failover {
            info!(account_id = %self.account_id(), to = %role, "Failed over to healthy slot");
            self.inner.emit(kind);
        }

        Some(AgentLease::new(Arc::clone(&self.inner), role, agent))
    }

    /// Mark the current agent in `role` as connected.
    pub fn mark_connected(&self, role: SlotRole) {
        self.inner.on_connect(role, None);
    }

    pub fn mark_error(&self, role: SlotRole, error: &TransportError) {
        self.inner.on_error(role, None, error);
    }

    pub fn mark_closed(&self, role: SlotRole) {
        self.inner.on_close(role, None);
    }

    pub fn get_status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            account_id: self.inner.account_id.clone(),
            proxy: self.inner.descriptor.redacted_uri(),
            active_role: state.active,
            connection_state: PoolConnectionState {
                healthy_slots: state.healthy_slots(),
                total_slots: state.total_slots(),
                primary: state.primary.as_ref().map(|s| s.status(SlotRole::Primary)),
                secondary: state.secondary.as_ref().map(|s| s.status(SlotRole::Secondary)),
            },
            stats: state.stats,
            idle_secs: state.last_used_at.elapsed().as_secs(),
        }
    }

    /// Mean latency across both slots' history.
    pub fn avg_latency(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        let samples: Vec<Duration> = [&state.primary, &state.secondary]
            .into_iter()
            .flatten()
            .filter_map(|s| s.health.avg_latency())
            .collect();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<Duration>() / samples.len() as u32)
    }

    pub fn healthy_slots(&self) -> usize {
        self.inner.state.lock().healthy_slots()
    }

    pub fn total_slots(&self) -> usize {
        self.inner.state.lock().total_slots()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy_slots() > 0
    }

    pub fn active_role(&self) -> SlotRole {
        self.inner.state.lock().active
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Replace both agents with freshly built and warmed ones.
    ///
    /// Stats are kept. The old agents are closed after the swap.
    pub async fn recreate(&self) -> Result<PoolStatus, RegistryError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let old = self.inner.install_pair(true).await?;

        let _guard = ReleaseGuard(old.clone());
        for agent in &old {
            if let Err(e) = self.inner.driver.close(agent).await {
                warn!(account_id = %self.account_id(), agent_id = agent.id(), error = %e, "Failed to close replaced agent");
            }
        }

        info!(
            account_id = %self.account_id(),
            healthy_slots = self.healthy_slots(),
            "Connection pool recreated"
        );
        Ok(self.get_status())
    }

    /// Close both agents, primary first.
    ///
    /// Idempotent. Agents are released even if a close fails or this future
    /// is dropped mid-way. Returns the first close error.
    pub async fn destroy(&self) -> Result<(), TransportError> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let agents: Vec<Arc<ProxyAgent>> = {
            let state = self.inner.state.lock();
            [&state.primary, &state.secondary]
                .into_iter()
                .flatten()
                .map(|s| Arc::clone(&s.agent))
                .collect()
        };
        let guard = ReleaseGuard(agents);

        let mut first_error = None;
        for agent in &guard.0 {
            if let Err(e) = self.inner.driver.close(agent).await {
                warn!(account_id = %self.account_id(), agent_id = agent.id(), error = %e, "Agent close failed");
                first_error.get_or_insert(e);
            }
        }
        drop(guard);

        self.inner.clear_slots();
        info!(account_id = %self.account_id(), "Connection pool destroyed");
        first_error.map_or(Ok(()), Err)
    }

    /// Drop both agents without waiting for a close. Returns how many were
    /// still live.
    pub fn force_release(&self) -> usize {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        let agents = self.inner.state.lock().take_agents();
        let released = agents.iter().filter(|a| a.release()).count();
        if released > 0 {
            warn!(account_id = %self.account_id(), released, "Force-released pool agents");
        }
        self.inner.clear_slots();
        released
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("account_id", &self.inner.account_id)
            .field("proxy", &self.inner.descriptor.redacted_uri())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl PoolInner {
    pub(crate) fn account_id(&self) -> &str {
        &self.account_id
    }

    fn emit(&self, kind: PoolEventKind) {
        self.events.emit(PoolEvent::new(&self.account_id, kind));
    }

    fn emit_all(&self, kinds: Vec<PoolEventKind>) {
        for kind in kinds {
            self.emit(kind);
        }
    }

    /// Build, warm and install a new pair. Returns the agents it replaced.
    async fn install_pair(&self, replacing: bool) -> Result<Vec<Arc<ProxyAgent>>, RegistryError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(RegistryError::not_found(&self.account_id));
        }

        let primary = Arc::new(ProxyAgentFactory::build(&self.descriptor, SlotRole::Primary, &self.options)?);
        let secondary = Arc::new(ProxyAgentFactory::build(&self.descriptor, SlotRole::Secondary, &self.options)?);

        let (primary_warm, secondary_warm) =
            futures::join!(self.driver.warm(&primary), self.driver.warm(&secondary));

        let mut events = Vec::new();
        let old = {
            let mut state = self.state.lock();
            if self.destroyed.load(Ordering::SeqCst) {
                primary.release();
                secondary.release();
                return Err(RegistryError::not_found(&self.account_id));
            }

            let old = state.take_agents();
            for (role, agent, warmed) in [
                (SlotRole::Primary, primary, primary_warm),
                (SlotRole::Secondary, secondary, secondary_warm),
            ] {
                let mut slot = Slot::new(agent, self.latency_history);
                match warmed {
                    Ok(latency) => {
                        slot.health.record_latency(latency);
                        slot.health.mark_connected();
                        debug!(account_id = %self.account_id, role = %role, latency_ms = latency.as_millis() as u64, "Slot pre-warmed");
                        events.push(if replacing {
                            PoolEventKind::Reconnected { role }
                        } else {
                            PoolEventKind::Connected { role }
                        });
                    }
                    Err(e) => {
                        let consecutive_errors = slot.health.mark_error(e.to_string());
                        state.stats.error_count += 1;
                        warn!(account_id = %self.account_id, role = %role, error = %e, "Slot pre-warm failed");
                        events.push(PoolEventKind::Error { role, message: e.to_string(), consecutive_errors });
                    }
                }
                state.set_slot(role, Some(slot));
            }
            state.active = SlotRole::Primary;
            events.extend(state.status_change());
            old
        };

        self.emit_all(events);
        Ok(old)
    }

    fn clear_slots(&self) {
        let change = {
            let mut state = self.state.lock();
            state.primary = None;
            state.secondary = None;
            state.status_change()
        };
        if let Some(kind) = change {
            self.emit(kind);
        }
    }

    pub(crate) fn on_connect(&self, role: SlotRole, agent_id: Option<u64>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(slot) = state.slot_for(role, agent_id) else {
                return;
            };
            match slot.health.mark_connected() {
                ConnectTransition::Unchanged => return,
                ConnectTransition::Connected => events.push(PoolEventKind::Connected { role }),
                ConnectTransition::Reconnected => events.push(PoolEventKind::Reconnected { role }),
            }
            events.extend(state.status_change());
        }
        debug!(account_id = %self.account_id, role = %role, "Slot connected");
        self.emit_all(events);
    }

    pub(crate) fn on_error(&self, role: SlotRole, agent_id: Option<u64>, error: &TransportError) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let message = error.to_string();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(slot) = state.slot_for(role, agent_id) else {
                return;
            };
            let consecutive_errors = slot.health.mark_error(message.clone());
            state.stats.error_count += 1;
            warn!(account_id = %self.account_id, role = %role, consecutive_errors, error = %message, "Slot error");
            events.push(PoolEventKind::Error { role, message, consecutive_errors });
            events.extend(state.status_change());
        }
        self.emit_all(events);
    }

    pub(crate) fn on_close(&self, role: SlotRole, agent_id: Option<u64>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(slot) = state.slot_for(role, agent_id) else {
                return;
            };
            if !slot.health.mark_closed() {
                return;
            }
            events.push(PoolEventKind::Disconnected { role });
            events.extend(state.status_change());
        }
        debug!(account_id = %self.account_id, role = %role, "Slot disconnected");
        self.emit_all(events);
    }

    pub(crate) fn on_latency(&self, role: SlotRole, agent_id: Option<u64>, latency: Duration) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slot_for(role, agent_id) {
            slot.health.record_latency(latency);
        }
    }
}
