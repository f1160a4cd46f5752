//! Core error types for studylamp-core.
//!
//! Most engine faults never reach the caller: storage faults degrade to
//! "no session available" inside [`SessionStore`](crate::storage::SessionStore).
//! The types here surface where a caller explicitly asks for a `Result`
//! (backends, `try_save`, configuration, snapshot validation).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for studylamp-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a [`PersistentStore`](crate::storage::PersistentStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open the database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The value does not fit in the backend's quota
    #[error("Quota exceeded writing '{key}': {size} bytes over a limit of {limit}")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Snapshot could not be serialized
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A lock guarding the backend was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Snapshot invariant violations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A running counter disagrees with the answers it summarizes
    #[error("Counter '{counter}' is {actual}, expected {expected}")]
    CounterMismatch {
        counter: &'static str,
        expected: u64,
        actual: u64,
    },

    /// A counter exceeds the counter that bounds it
    #[error("Counter '{counter}' ({value}) exceeds '{bound}' ({bound_value})")]
    CounterExceeds {
        counter: &'static str,
        value: u32,
        bound: &'static str,
        bound_value: u32,
    },

    /// Saved-at precedes created-at
    #[error("lastSavedAt ({last_saved}) is earlier than createdAt ({created})")]
    InvalidTimestamps { created: i64, last_saved: i64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

