//! Registry-level errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ConfigError;

/// Errors surfaced by the pool registry.
///
/// `NotInitialized` and `NotFound` are raised immediately on misuse. A wrapped
/// config error only escapes from operations that target a single account
/// (`add`, `recreate_connection`).
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum RegistryError {
    /// `get_connection` was called before the first initialization sweep finished
    #[error("Pool registry is not initialized")]
    NotInitialized,

    /// No pool exists for the account
    #[error("No connection pool for account: {account_id}")]
    NotFound { account_id: String },

    /// Descriptor rejected for one account
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The account store could not be read
    #[error("Account store error: {message}")]
    Store { message: String },
}

impl RegistryError {
    pub fn not_found(account_id: &str) -> Self {
        Self::NotFound { account_id: account_id.to_string() }
    }

    /// Whether this error represents caller misuse rather than a per-account failure.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::NotFound { .. })
    }
}
