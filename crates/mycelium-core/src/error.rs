use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MyceliumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node already registered: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("Failed to read content at {locator}: {reason}")]
    ContentRead { locator: String, reason: String },

    #[error("Failed to write content at {locator}: {reason}")]
    ContentWrite { locator: String, reason: String },

    #[error("Content operation on {locator} timed out after {timeout:?}")]
    ContentTimeout { locator: String, timeout: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl MyceliumError {
    pub fn read<L: Into<String>, R: ToString>(locator: L, reason: R) -> Self {
        Self::ContentRead {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write<L: Into<String>, R: ToString>(locator: L, reason: R) -> Self {
        Self::ContentWrite {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    /// Content errors are scoped to a single edge; a sync cycle records them and moves on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ContentRead { .. } | Self::ContentWrite { .. } | Self::ContentTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MyceliumError>;
