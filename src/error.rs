//! Error types. Storage failures travel through the event log and the projector
//! untouched; only the command layer adds its own validation/not-found cases.

use thiserror::Error;

/// Failure of an append, query or upsert against the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

/// Errors returned by the command handlers.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        CommandError::Validation(msg.into())
    }

    pub(crate) fn conflict(msg: impl Into<String>) -> Self {
        CommandError::Conflict(msg.into())
    }
}
