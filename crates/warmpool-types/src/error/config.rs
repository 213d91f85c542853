//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating proxy descriptors or loading configuration.
///
/// These fail fast at build time and are isolated per account.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// A required descriptor field is absent or blank
    #[error("Missing required proxy field: {field}")]
    MissingField {
        /// Name of the absent field
        field: String,
    },

    /// Port is not an integer in [1, 65535]
    #[error("Invalid proxy port: {value} (expected 1-65535)")]
    InvalidPort {
        /// The rejected value as written
        value: String,
    },

    /// Proxy type is not one of socks5, http, https
    #[error("Unsupported proxy type: {value}")]
    UnsupportedProxyType {
        /// The rejected type string
        value: String,
    },

    /// Host contains characters that cannot appear in a proxy endpoint
    #[error("Invalid proxy host: {host}")]
    InvalidHost {
        /// The rejected host
        host: String,
    },

    /// Config file parse error
    #[error("Config parse error: {message}")]
    ParseError {
        /// Description of the parse failure
        message: String,
    },

    /// Config validation error (invalid values)
    #[error("Config validation error for {field}: {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },
}

impl ConfigError {
    pub fn missing(field: &str) -> Self {
        Self::MissingField { field: field.to_string() }
    }

    /// Create a parse error from a serde_json error.
    pub fn from_json_error(e: &serde_json::Error) -> Self {
        Self::ParseError { message: e.to_string() }
    }
}
