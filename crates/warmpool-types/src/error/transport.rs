//! Socket-level errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures observed on an agent's connection.
///
/// Recorded as slot-unhealthy by the owning pool; never thrown out of
/// connection selection.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum TransportError {
    /// Connecting to (or through) the proxy failed
    #[error("Connect failed: {message}")]
    ConnectFailed { message: String },

    /// Connect or close did not finish in time
    #[error("Timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The socket was closed by the peer or by us
    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectFailed { message: message.into() }
    }
}
