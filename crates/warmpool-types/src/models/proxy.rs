//! Proxy descriptors.
//!
//! Account stores hand us loosely typed proxy settings (`RawProxyConfig`).
//! They are validated exactly once, at the boundary, into the
//! `ProxyDescriptor` enum; nothing downstream re-checks host or port.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;

use crate::error::ConfigError;

/// Supported outbound proxy protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Socks5,
    Http,
    Https,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
        }
    }

    /// URI scheme handed to the HTTP client. SOCKS5 resolves names at the proxy.
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyKind::Socks5 => "socks5h",
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "socks5" | "socks5h" | "socks" => Ok(ProxyKind::Socks5),
            "http" => Ok(ProxyKind::Http),
            "https" => Ok(ProxyKind::Https),
            _ => Err(ConfigError::UnsupportedProxyType { value: value.to_string() }),
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family used for the local side of proxy connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    #[default]
    Ipv4,
    Ipv6,
}

/// Basic-auth credentials for a proxy.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Validated host/port/credentials of one proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    host: String,
    port: u16,
    credentials: Option<ProxyCredentials>,
}

impl ProxyEndpoint {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }
}

/// An immutable, validated outbound proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProxyConfig", into = "RawProxyConfig")]
pub enum ProxyDescriptor {
    Socks5(ProxyEndpoint),
    Http(ProxyEndpoint),
    Https(ProxyEndpoint),
}

impl ProxyDescriptor {
    /// Build a descriptor, validating host and port.
    pub fn new(kind: ProxyKind, host: &str, port: u16) -> Result<Self, ConfigError> {
        let host = validate_host(Some(host))?;
        if port == 0 {
            return Err(ConfigError::InvalidPort { value: "0".to_string() });
        }
        let endpoint = ProxyEndpoint { host, port, credentials: None };
        Ok(match kind {
            ProxyKind::Socks5 => ProxyDescriptor::Socks5(endpoint),
            ProxyKind::Http => ProxyDescriptor::Http(endpoint),
            ProxyKind::Https => ProxyDescriptor::Https(endpoint),
        })
    }

    /// Attach basic-auth credentials. A blank username leaves the descriptor unauthenticated.
    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: Option<&str>) -> Self {
        let credentials = (!username.trim().is_empty()).then(|| ProxyCredentials {
            username: username.to_string(),
            password: password.map(str::to_string),
        });
        self.endpoint_mut().credentials = credentials;
        self
    }

    pub fn kind(&self) -> ProxyKind {
        match self {
            ProxyDescriptor::Socks5(_) => ProxyKind::Socks5,
            ProxyDescriptor::Http(_) => ProxyKind::Http,
            ProxyDescriptor::Https(_) => ProxyKind::Https,
        }
    }

    pub fn endpoint(&self) -> &ProxyEndpoint {
        match self {
            ProxyDescriptor::Socks5(e) | ProxyDescriptor::Http(e) | ProxyDescriptor::Https(e) => e,
        }
    }

    fn endpoint_mut(&mut self) -> &mut ProxyEndpoint {
        match self {
            ProxyDescriptor::Socks5(e) | ProxyDescriptor::Http(e) | ProxyDescriptor::Https(e) => e,
        }
    }

    pub fn host(&self) -> &str {
        self.endpoint().host()
    }

    pub fn port(&self) -> u16 {
        self.endpoint().port()
    }

    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.endpoint().credentials()
    }

    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        let host = self.host();
        if host.contains(':') {
            format!("[{}]:{}", host, self.port())
        } else {
            format!("{}:{}", host, self.port())
        }
    }

    /// URI safe for logs: scheme, authority, and the username only.
    pub fn redacted_uri(&self) -> String {
        match self.credentials() {
            Some(c) => format!("{}://{}:***@{}", self.kind(), c.username, self.authority()),
            None => format!("{}://{}", self.kind(), self.authority()),
        }
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_uri())
    }
}

/// Loosely typed proxy settings as stored by account stores.
///
/// Every field is kept as raw JSON so that a wrongly typed value fails
/// validation for its own account instead of the whole store read. `port`
/// accepts either a JSON number or a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProxyConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub proxy_type: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<serde_json::Value>,
}

impl TryFrom<RawProxyConfig> for ProxyDescriptor {
    type Error = ConfigError;

    fn try_from(raw: RawProxyConfig) -> Result<Self, Self::Error> {
        let kind = match text_field(raw.proxy_type.as_ref()) {
            Ok(None) => return Err(ConfigError::missing("type")),
            Ok(Some(t)) => ProxyKind::parse(&t)?,
            Err(value) => return Err(ConfigError::UnsupportedProxyType { value }),
        };
        let host = match text_field(raw.host.as_ref()) {
            Ok(host) => validate_host(host.as_deref())?,
            Err(host) => return Err(ConfigError::InvalidHost { host }),
        };
        let port = validate_port(raw.port.as_ref())?;

        let username = credential_field(raw.username.as_ref(), "username")?;
        let password = credential_field(raw.password.as_ref(), "password")?;

        let descriptor = ProxyDescriptor::new(kind, &host, port)?;
        Ok(match username {
            Some(user) => descriptor.with_credentials(&user, password.as_deref()),
            None => descriptor,
        })
    }
}

/// Trimmed string content of a loose field. Blank and null read as absent;
/// any other non-string is returned as the offending text.
fn text_field(value: Option<&serde_json::Value>) -> Result<Option<String>, String> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(other.to_string()),
    }
}

/// Credentials may be numeric in hand-written stores; anything else is rejected.
fn credential_field(value: Option<&serde_json::Value>, field: &str) -> Result<Option<String>, ConfigError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(ConfigError::ValidationError {
            field: field.to_string(),
            message: "expected a string".to_string(),
        }),
    }
}

impl From<ProxyDescriptor> for RawProxyConfig {
    fn from(descriptor: ProxyDescriptor) -> Self {
        let credentials = descriptor.credentials().cloned();
        RawProxyConfig {
            proxy_type: Some(descriptor.kind().as_str().into()),
            host: Some(descriptor.host().into()),
            port: Some(descriptor.port().into()),
            username: credentials.as_ref().map(|c| c.username.as_str().into()),
            password: credentials.and_then(|c| c.password).map(serde_json::Value::from),
        }
    }
}

fn validate_host(host: Option<&str>) -> Result<String, ConfigError> {
    let host = host.map(str::trim).unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::missing("host"));
    }
    let invalid = || ConfigError::InvalidHost { host: host.to_string() };

    let bracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']'));
    let bare = bracketed.unwrap_or(host);
    if bare.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '@' | '?' | '#' | '[' | ']')) {
        return Err(invalid());
    }
    // A colon is only legal inside an IPv6 literal; `host:port` is not a host.
    if (bracketed.is_some() || bare.contains(':')) && bare.parse::<Ipv6Addr>().is_err() {
        return Err(invalid());
    }
    Ok(bare.to_string())
}

fn validate_port(port: Option<&serde_json::Value>) -> Result<u16, ConfigError> {
    let value = match port {
        None | Some(serde_json::Value::Null) => return Err(ConfigError::missing("port")),
        Some(v) => v,
    };
    let invalid = || ConfigError::InvalidPort { value: value.to_string().trim_matches('"').to_string() };

    let number = match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or_else(invalid)?,
        serde_json::Value::String(s) if s.trim().is_empty() => {
            return Err(ConfigError::missing("port"))
        },
        serde_json::Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    match u16::try_from(number) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(invalid()),
    }
}
