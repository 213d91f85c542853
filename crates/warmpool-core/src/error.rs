//! Unified error type for file-backed operations in warmpool-core.
//!
//! Pool and registry operations use the typed errors from `warmpool-types`
//! directly; this type covers config loading and the account store files.

use serde::Serialize;
use thiserror::Error;
use warmpool_types::{ConfigError, RegistryError};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry operation failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Data directory could not be resolved.
    #[error("Data directory error: {0}")]
    DataDir(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for warmpool-core file operations.
pub type AppResult<T> = Result<T, AppError>;
