//! Error types for mailguard.

use std::time::Duration;

/// Top-level error type for the subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),
}

/// Persistence-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Error record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by recovery handlers.
///
/// The manager converts these into a failed attempt rather than propagating
/// them, so a misbehaving handler consumes exactly one unit of the record's
/// attempt budget.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Reconnect timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Reconnect failed: {0}")]
    Reconnect(String),

    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Result type alias for the subsystem.
pub type Result<T> = std::result::Result<T, Error>;
