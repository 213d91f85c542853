//! Pre-warm and close operations on agents.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use warmpool_types::models::PoolSettings;
use warmpool_types::{IpFamily, TransportError};

use super::ProxyAgent;

/// Network side of an agent's lifecycle.
///
/// Pools call `warm` when building or rebuilding slots and `close` on teardown.
#[async_trait]
pub trait ConnectionDriver: Send + Sync {
    /// Establish (or verify) the agent's connection and return the observed latency.
    async fn warm(&self, agent: &ProxyAgent) -> Result<Duration, TransportError>;

    /// Close the agent's socket.
    async fn close(&self, agent: &ProxyAgent) -> Result<(), TransportError>;
}

/// Default driver.
///
/// Warms by sending a HEAD through the agent's own client, so the tunnel it
/// opens stays in the client's idle pool for the next request. Without a
/// warm-up URL it can only dial the proxy endpoint to prove it is reachable;
/// nothing is kept open in that mode.
pub struct TunnelDriver {
    connect_timeout: Duration,
    warmup_url: Option<String>,
}

impl TunnelDriver {
    pub fn new(connect_timeout: Duration, warmup_url: Option<String>) -> Self {
        Self { connect_timeout, warmup_url }
    }

    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self::new(settings.connect_timeout(), settings.warmup_url.clone())
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout { after_ms: self.connect_timeout.as_millis() as u64 }
    }

    async fn warm_through_tunnel(&self, agent: &ProxyAgent, url: &str) -> Result<(), TransportError> {
        let client = agent.client().ok_or(TransportError::Closed)?;
        let response = client
            .head(url)
            .timeout(self.connect_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.timeout_error()
                } else {
                    TransportError::connect(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(TransportError::connect("proxy rejected credentials (407)"));
        }
        tracing::trace!(status = %status, "Warm-up response");
        Ok(())
    }

    async fn dial_proxy(&self, agent: &ProxyAgent) -> Result<(), TransportError> {
        let addrs: Vec<SocketAddr> =
            tokio::time::timeout(self.connect_timeout, tokio::net::lookup_host((agent.host(), agent.port())))
                .await
                .map_err(|_| self.timeout_error())?
                .map_err(|e| TransportError::connect(format!("resolve {}: {}", agent.host(), e)))?
                .collect();

        let target = pick_address(&addrs, agent.ip_family()).ok_or_else(|| {
            TransportError::connect(format!("no address for {}", agent.host()))
        })?;

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| TransportError::connect(format!("connect {}: {}", target, e)))?;
        drop(stream);
        Ok(())
    }
}

#[async_trait]
impl ConnectionDriver for TunnelDriver {
    async fn warm(&self, agent: &ProxyAgent) -> Result<Duration, TransportError> {
        if agent.is_released() {
            return Err(TransportError::Closed);
        }

        let started = Instant::now();
        match self.warmup_url.as_deref() {
            Some(url) => self.warm_through_tunnel(agent, url).await?,
            None => self.dial_proxy(agent).await?,
        }
        Ok(started.elapsed())
    }

    async fn close(&self, agent: &ProxyAgent) -> Result<(), TransportError> {
        agent.release();
        Ok(())
    }
}

/// Prefer an address of the requested family, falling back to whatever resolved.
fn pick_address(addrs: &[SocketAddr], family: IpFamily) -> Option<SocketAddr> {
    let wanted = |a: &&SocketAddr| match family {
        IpFamily::Ipv4 => a.is_ipv4(),
        IpFamily::Ipv6 => a.is_ipv6(),
    };
    addrs.iter().find(wanted).or_else(|| addrs.first()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use crate::agent::{AgentOptions, ProxyAgentFactory};
    use warmpool_types::{ProxyDescriptor, ProxyKind, SlotRole};

    fn agent_for(port: u16) -> ProxyAgent {
        let descriptor = ProxyDescriptor::new(ProxyKind::Http, "127.0.0.1", port).unwrap();
        ProxyAgentFactory::build(&descriptor, SlotRole::Primary, &AgentOptions::default()).unwrap()
    }

    #[test]
    fn test_pick_address_prefers_family() {
        let v4: SocketAddr = "1.2.3.4:80".parse().unwrap();
        let v6: SocketAddr = "[::1]:80".parse().unwrap();

        assert_eq!(pick_address(&[v6, v4], IpFamily::Ipv4), Some(v4));
        assert_eq!(pick_address(&[v4, v6], IpFamily::Ipv6), Some(v6));
        assert_eq!(pick_address(&[v6], IpFamily::Ipv4), Some(v6));
        assert_eq!(pick_address(&[], IpFamily::Ipv4), None);
    }

    /// Accept one connection, answer its first request with an empty 200 and
    /// report whether the client still holds the socket open `hold` later.
    fn serve_one_and_watch(listener: TcpListener, hold: Duration) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "client hung up before finishing its request");
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await.unwrap();

            let still_open = match tokio::time::timeout(hold, stream.read(&mut buf)).await {
                Err(_) => true,
                Ok(Ok(n)) => n > 0,
                Ok(Err(_)) => false,
            };
            let _ = tx.send(still_open);
        });
        rx
    }

    #[tokio::test]
    async fn test_warm_keeps_tunnel_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let still_open = serve_one_and_watch(listener, Duration::from_millis(300));
        let driver = TunnelDriver::new(Duration::from_secs(2), Some("http://warmup.test/".to_string()));

        let agent = agent_for(port);
        driver.warm(&agent).await.unwrap();

        assert!(still_open.await.unwrap());
        assert!(!agent.is_released());
    }

    #[test]
    fn test_default_settings_warm_through_client() {
        let driver = TunnelDriver::from_settings(&PoolSettings::default());
        assert!(driver.warmup_url.is_some());
    }

    #[tokio::test]
    async fn test_warm_dials_listening_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let driver = TunnelDriver::new(Duration::from_secs(2), None);

        let latency = driver.warm(&agent_for(port)).await.unwrap();
        assert!(latency < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_warm_fails_on_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let driver = TunnelDriver::new(Duration::from_secs(2), None);
        let err = driver.warm(&agent_for(port)).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_close_releases_and_warm_then_fails() {
        let driver = TunnelDriver::new(Duration::from_secs(1), None);
        let agent = agent_for(9);

        driver.close(&agent).await.unwrap();
        assert!(agent.is_released());
        assert_eq!(driver.warm(&agent).await.unwrap_err(), TransportError::Closed);
    }
}
