//! Account records as read from the account store.

use serde::{Deserialize, Serialize};

use super::proxy::{ProxyDescriptor, RawProxyConfig};
use crate::error::ConfigError;

/// A tenant account bound to one upstream proxy.
///
/// The proxy is kept raw here; it is validated when a pool is built for it so
/// that one malformed record cannot prevent the rest of the store from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Unique identifier for the account
    pub id: String,
    /// Display name (for logging)
    #[serde(default)]
    pub name: String,
    /// Inactive accounts never get a pool
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Outbound proxy settings, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<RawProxyConfig>,
}

const fn default_active() -> bool {
    true
}

impl AccountRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, proxy: Option<RawProxyConfig>) -> Self {
        Self { id: id.into(), name: name.into(), is_active: true, proxy }
    }

    /// Validated descriptor for this account.
    ///
    /// Returns `Ok(None)` when the account has no proxy configured at all.
    pub fn descriptor(&self) -> Result<Option<ProxyDescriptor>, ConfigError> {
        self.proxy.clone().map(ProxyDescriptor::try_from).transpose()
    }
}
