//! Error types for labtrack-client

use labtrack_core::{ConfigError, DocumentStatus, StoreError};
use thiserror::Error;

/// Errors surfaced by the sync layer
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request did not complete (connection refused, timeout, ...)
    #[error("Request failed: {0}")]
    Network(String),

    /// The service answered with a non-success status
    #[error("Service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body was not what the collection expects
    #[error("Decode error: {0}")]
    Decode(String),

    /// The payload could not be prepared for sending
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Document status change not allowed from the cached status
    #[error("Invalid document status transition from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Session file could not be read or written
    #[error("Session error: {0}")]
    Session(String),

    /// Sync settings rejected before the store was built
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// True for failures where the service was never reached
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
