//! Outbound proxy agents.
//!
//! An agent is one long-lived transport handle: a `reqwest::Client` pinned
//! to a single proxy and allowed to keep exactly one idle connection, so the
//! tunnel established during pre-warm is reused by every later request.
//!
//! Socket-level outcomes are not observable through the client itself; the
//! relay layer reports them back through the pool's `AgentLease`.

mod driver;

pub use driver::{ConnectionDriver, TunnelDriver};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use url::Url;
use warmpool_types::models::PoolSettings;
use warmpool_types::{ConfigError, IpFamily, ProxyDescriptor, ProxyKind, RawProxyConfig, SlotRole};

static NEXT_AGENT_ID: AtomicU64 = AtomicU64::new(1);

/// Construction options shared by every agent of a registry.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub preferred_ip_family: IpFamily,
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub pool_idle_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from(&PoolSettings::default())
    }
}

impl From<&PoolSettings> for AgentOptions {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            preferred_ip_family: settings.preferred_ip_family,
            connect_timeout: settings.connect_timeout(),
            tcp_keepalive: Duration::from_secs(settings.tcp_keepalive_secs),
            pool_idle_timeout: Duration::from_secs(settings.pool_idle_timeout_secs),
        }
    }
}

/// One transport handle through one proxy.
pub struct ProxyAgent {
    id: u64,
    role: SlotRole,
    descriptor: ProxyDescriptor,
    ip_family: IpFamily,
    client: Mutex<Option<Client>>,
    created_at: Instant,
}

impl ProxyAgent {
    /// Unique per process; used to ignore reports about replaced agents.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> SlotRole {
        self.role
    }

    pub fn descriptor(&self) -> &ProxyDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> ProxyKind {
        self.descriptor.kind()
    }

    pub fn host(&self) -> &str {
        self.descriptor.host()
    }

    pub fn port(&self) -> u16 {
        self.descriptor.port()
    }

    pub fn ip_family(&self) -> IpFamily {
        self.ip_family
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The kept-alive client, or `None` once the agent has been released.
    pub fn client(&self) -> Option<Client> {
        self.client.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.client.lock().is_none()
    }

    /// Drop the client and with it the idle socket. Returns false if already released.
    ///
    /// Clones handed out earlier keep working until their in-flight request ends.
    pub fn release(&self) -> bool {
        self.client.lock().take().is_some()
    }
}

impl std::fmt::Debug for ProxyAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAgent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("proxy", &self.descriptor.redacted_uri())
            .field("ip_family", &self.ip_family)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Builds agents from descriptors. Pure construction: no I/O.
pub struct ProxyAgentFactory;

impl ProxyAgentFactory {
    pub fn build(
        descriptor: &ProxyDescriptor,
        role: SlotRole,
        options: &AgentOptions,
    ) -> Result<ProxyAgent, ConfigError> {
        let uri = Self::proxy_uri(descriptor)?;
        let proxy = reqwest::Proxy::all(uri.as_str()).map_err(|e| ConfigError::ValidationError {
            field: "proxy".to_string(),
            message: e.to_string(),
        })?;

        let local_address = match options.preferred_ip_family {
            IpFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(options.pool_idle_timeout)
            .tcp_keepalive(options.tcp_keepalive)
            .tcp_nodelay(true)
            .local_address(local_address)
            .build()
            .map_err(|e| ConfigError::ValidationError {
                field: "proxy".to_string(),
                message: format!("failed to build client: {}", e),
            })?;

        let id = NEXT_AGENT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            agent_id = id,
            role = %role,
            proxy = %descriptor,
            ip_family = ?options.preferred_ip_family,
            "Built proxy agent"
        );

        Ok(ProxyAgent {
            id,
            role,
            descriptor: descriptor.clone(),
            ip_family: options.preferred_ip_family,
            client: Mutex::new(Some(client)),
            created_at: Instant::now(),
        })
    }

    /// Validate loosely typed settings, then build.
    pub fn build_from_raw(
        raw: &RawProxyConfig,
        role: SlotRole,
        options: &AgentOptions,
    ) -> Result<ProxyAgent, ConfigError> {
        let descriptor = ProxyDescriptor::try_from(raw.clone())?;
        Self::build(&descriptor, role, options)
    }

    /// Connection URI with basic-auth credentials embedded (percent-encoded).
    pub fn proxy_uri(descriptor: &ProxyDescriptor) -> Result<Url, ConfigError> {
        let invalid_host = || ConfigError::InvalidHost { host: descriptor.host().to_string() };

        let mut url = Url::parse(&format!("{}://{}", descriptor.kind().scheme(), descriptor.authority()))
            .map_err(|_| invalid_host())?;

        if let Some(credentials) = descriptor.credentials() {
            url.set_username(&credentials.username).map_err(|()| invalid_host())?;
            url.set_password(credentials.password.as_deref()).map_err(|()| invalid_host())?;
        }

        Ok(url)
    }
}
