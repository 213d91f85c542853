//! Handle given to the relay layer for one outbound call.

use std::sync::Arc;
use std::time::Duration;

use warmpool_types::{SlotRole, TransportError};

use super::PoolInner;
use crate::agent::ProxyAgent;

/// A selected slot.
///
/// The relay attaches `client()` to its request and reports what the socket
/// did. Reports about an agent that has since been replaced are ignored.
pub struct AgentLease {
    pool: Arc<PoolInner>,
    role: SlotRole,
    agent: Arc<ProxyAgent>,
}

impl AgentLease {
    pub(super) fn new(pool: Arc<PoolInner>, role: SlotRole, agent: Arc<ProxyAgent>) -> Self {
        Self { pool, role, agent }
    }

    pub fn account_id(&self) -> &str {
        self.pool.account_id()
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn agent(&self) -> &Arc<ProxyAgent> {
        &self.agent
    }

    /// The agent's kept-alive HTTP client; `None` if the pool was torn down.
    pub fn client(&self) -> Option<reqwest::Client> {
        self.agent.client()
    }

    pub fn report_connected(&self) {
        self.pool.on_connect(self.role, Some(self.agent.id()));
    }

    pub fn report_error(&self, error: &TransportError) {
        self.pool.on_error(self.role, Some(self.agent.id()), error);
    }

    pub fn report_closed(&self) {
        self.pool.on_close(self.role, Some(self.agent.id()));
    }

    pub fn report_latency(&self, latency: Duration) {
        self.pool.on_latency(self.role, Some(self.agent.id()), latency);
    }
}

impl std::fmt::Debug for AgentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLease")
            .field("account_id", &self.account_id())
            .field("role", &self.role)
            .field("agent_id", &self.agent.id())
            .finish()
    }
}
