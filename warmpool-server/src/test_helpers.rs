//! Test helpers for warmpool-server unit tests.

use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use warmpool_core::{HybridMonitor, JsonAccountStore, PoolRegistry, TunnelDriver};
use warmpool_types::{AccountRecord, RawProxyConfig, WarmpoolConfig};

use crate::state::AppState;

/// Everything a handler test needs alive for its duration.
pub struct TestContext {
    pub state: AppState,
    pub proxy_port: u16,
    proxy: JoinHandle<()>,
    _dir: TempDir,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.proxy.abort();
    }
}

const WARMUP_URL: &str = "http://warmup.test/";

/// Stand-in forward proxy: answers every request with an empty 200 and
/// keeps the connection alive, which is all a pre-warm needs.
async fn spawn_forward_proxy() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind stand-in proxy");
    let port = listener.local_addr().expect("listener has no address").port();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(answer_requests(stream));
        }
    });
    (port, handle)
}

async fn answer_requests(mut stream: TcpStream) {
    let mut pending = Vec::new();
    let mut buf = [0_u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => pending.extend_from_slice(&buf[..n]),
        }
        while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
            pending.drain(..end + 4);
            if stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await.is_err() {
                return;
            }
        }
    }
}

/// Raw proxy settings pointing at the stand-in proxy.
pub fn proxy_at(port: u16) -> RawProxyConfig {
    RawProxyConfig {
        proxy_type: Some("http".into()),
        host: Some("127.0.0.1".into()),
        port: Some(serde_json::Value::from(port)),
        username: None,
        password: None,
    }
}

/// Build an initialized `AppState` whose accounts file holds one account per
/// id, all pointing at the local stand-in proxy.
pub async fn test_app_state(account_ids: &[&str]) -> TestContext {
    let dir = TempDir::new().expect("failed to create temp dir");
    let (proxy_port, proxy) = spawn_forward_proxy().await;

    let accounts: Vec<AccountRecord> =
        account_ids.iter().map(|id| AccountRecord::new(*id, *id, Some(proxy_at(proxy_port)))).collect();
    let store = JsonAccountStore::new(dir.path().join("accounts.json"));
    store.save(&accounts).await.expect("failed to write accounts");

    let mut config = WarmpoolConfig::default();
    config.pool.warmup_url = Some(WARMUP_URL.to_string());
    let registry = Arc::new(PoolRegistry::from_config(
        Arc::new(store),
        Arc::new(TunnelDriver::from_settings(&config.pool)),
        &config,
    ));
    registry.initialize_all().await.expect("failed to initialize registry");

    let monitor = HybridMonitor::new(registry.clone(), config.monitor.clone());
    let state = AppState::new(registry, monitor, config);

    TestContext { state, proxy_port, proxy, _dir: dir }
}
