//! Error types for labtrack-core

use thiserror::Error;

use crate::kind::RecordKind;

/// Result type alias for labtrack operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Coarse error category, mapped onto transport status codes by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is malformed (bad type, missing id, bad payload)
    BadRequest,
    /// The addressed record does not exist
    NotFound,
    /// Storage failed underneath an otherwise valid request
    InternalError,
}

/// Main error type for record store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unrecognized collection type selector
    #[error("Invalid data type: {0}")]
    InvalidKind(String),

    /// Update or delete issued without a record id
    #[error("ID is required")]
    MissingId,

    /// Payload is not a JSON object
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No record with that id in the collection
    #[error("Item not found: {kind}/{id}")]
    NotFound { kind: RecordKind, id: String },

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl StoreError {
    /// Category used to pick a response status
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::InvalidKind(_) | StoreError::MissingId | StoreError::InvalidPayload(_) => {
                ErrorCategory::BadRequest
            }
            StoreError::NotFound { .. } => ErrorCategory::NotFound,
            StoreError::Persistence(_) => ErrorCategory::InternalError,
        }
    }
}

/// Persistence-specific errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(PersistenceError::Serialization(err.to_string()))
    }
}
