//! Account store abstraction.
//!
//! The registry only reads from the store; account changes after startup
//! arrive through `PoolRegistry::sync_account`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use warmpool_types::{AccountRecord, ConfigError, RegistryError};

/// A store entry that could not be read as an account record.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Position in the store
    pub index: usize,
    /// The record's `id`, when it had a readable one
    pub id: Option<String>,
    pub error: ConfigError,
}

/// One read of the store: the usable records and the rejected ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountListing {
    pub accounts: Vec<AccountRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl AccountListing {
    pub fn total(&self) -> usize {
        self.accounts.len() + self.rejected.len()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, RegistryError>;

    /// Read every record, keeping malformed ones apart instead of failing the read.
    ///
    /// Stores whose records are already typed only need `list_accounts`.
    async fn load_accounts(&self) -> Result<AccountListing, RegistryError> {
        Ok(AccountListing { accounts: self.list_accounts().await?, rejected: Vec::new() })
    }

    async fn get_account(&self, id: &str) -> Result<AccountRecord, RegistryError> {
        self.list_accounts()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| RegistryError::not_found(id))
    }
}

fn store_error(message: impl Into<String>) -> RegistryError {
    RegistryError::Store { message: message.into() }
}

/// Reads a JSON array of account records from disk on every call.
#[derive(Debug, Clone)]
pub struct JsonAccountStore {
    path: PathBuf,
}

impl JsonAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the records atomically (temp file + rename).
    pub async fn save(&self, accounts: &[AccountRecord]) -> Result<(), RegistryError> {
        let content = serde_json::to_string_pretty(accounts)
            .map_err(|e| store_error(format!("Failed to serialize accounts: {}", e)))?;
        let temp_path = self.path.with_extension("json.tmp");

        if let Err(e) = tokio::fs::write(&temp_path, content).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(store_error(format!("Failed to write temp accounts file: {}", e)));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(store_error(format!("Failed to replace accounts file: {}", e)));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, RegistryError> {
        Ok(self.load_accounts().await?.accounts)
    }

    /// The file must be a JSON array; each element is decoded on its own.
    async fn load_accounts(&self) -> Result<AccountListing, RegistryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Accounts file not found, starting with no accounts");
                return Ok(AccountListing::default());
            },
            Err(e) => return Err(store_error(format!("Failed to read accounts file: {}", e))),
        };

        if content.trim().is_empty() {
            return Ok(AccountListing::default());
        }

        let entries: Vec<serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| store_error(format!("Failed to parse accounts file: {}", e)))?;

        let mut listing = AccountListing::default();
        for (index, entry) in entries.into_iter().enumerate() {
            let id = entry.get("id").and_then(serde_json::Value::as_str).map(str::to_string);
            match serde_json::from_value::<AccountRecord>(entry) {
                Ok(account) => listing.accounts.push(account),
                Err(e) => {
                    tracing::warn!(index, account_id = ?id, error = %e, "Skipping unreadable account record");
                    listing.rejected.push(RejectedRecord { index, id, error: ConfigError::from_json_error(&e) });
                },
            }
        }
        Ok(listing)
    }
}

/// In-process store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new(accounts: Vec<AccountRecord>) -> Self {
        Self { accounts: RwLock::new(accounts) }
    }

    /// Insert or replace by id.
    pub fn upsert(&self, account: AccountRecord) {
        let mut accounts = self.accounts.write();
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
    }

    pub fn remove(&self, id: &str) -> Option<AccountRecord> {
        let mut accounts = self.accounts.write();
        let index = accounts.iter().position(|a| a.id == id)?;
        Some(accounts.remove(index))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, RegistryError> {
        Ok(self.accounts.read().clone())
    }
}
