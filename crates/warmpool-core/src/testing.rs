//! Test doubles shared by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use warmpool_types::{ProxyDescriptor, ProxyKind, RawProxyConfig, TransportError};

use crate::agent::{ConnectionDriver, ProxyAgent};

/// Driver that never touches the network.
///
/// Warm succeeds unless the agent's host was marked failing. Close finishes
/// immediately unless `hang_on_close` is set, in which case it never returns.
#[derive(Default)]
pub struct MockDriver {
    failing_hosts: Mutex<HashSet<String>>,
    hang_on_close: bool,
    close_delay: Option<Duration>,
    pub warms: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hanging() -> Self {
        Self { hang_on_close: true, ..Self::default() }
    }

    pub fn slow_close(delay: Duration) -> Self {
        Self { close_delay: Some(delay), ..Self::default() }
    }

    pub fn fail_host(&self, host: &str) {
        self.failing_hosts.lock().insert(host.to_string());
    }

    pub fn heal_host(&self, host: &str) {
        self.failing_hosts.lock().remove(host);
    }
}

#[async_trait]
impl ConnectionDriver for MockDriver {
    async fn warm(&self, agent: &ProxyAgent) -> Result<Duration, TransportError> {
        self.warms.fetch_add(1, Ordering::SeqCst);
        if self.failing_hosts.lock().contains(agent.host()) {
            return Err(TransportError::connect(format!("{} refused", agent.host())));
        }
        Ok(Duration::from_millis(5))
    }

    async fn close(&self, agent: &ProxyAgent) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        agent.release();
        Ok(())
    }
}

pub fn descriptor(host: &str) -> ProxyDescriptor {
    ProxyDescriptor::new(ProxyKind::Socks5, host, 1080).unwrap()
}

pub fn raw_proxy(host: &str, port: i64) -> RawProxyConfig {
    RawProxyConfig {
        proxy_type: Some("socks5".into()),
        host: Some(host.into()),
        port: Some(serde_json::Value::from(port)),
        username: None,
        password: None,
    }
}
