//! Typed error definitions for warmpool.
//!
//! All errors are serializable for API responses, displayable for logging
//! and matchable by variant.
//!
//! Shutdown timeouts are deliberately absent: an overrun shutdown is reported
//! through `DestroyReport::timeout`, never raised.

mod config;
mod registry;
mod transport;

pub use config::ConfigError;
pub use registry::RegistryError;
pub use transport::TransportError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Malformed or missing proxy configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Registry misuse or lookup failure
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = TypedError::Registry(RegistryError::NotFound { account_id: "acc-123".to_string() });

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Registry"));
        assert!(json.contains("acc-123"));

        let deserialized: TypedError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidPort { value: "65536".to_string() };

        let msg = format!("{}", TypedError::from(err));
        assert!(msg.contains("65536"));
        assert!(msg.starts_with("Config error"));
    }
}
