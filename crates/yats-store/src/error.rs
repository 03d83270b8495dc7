use thiserror::Error;
use yats_core::types::TaskId;

/// Errors that can occur within the storage subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No record exists for the given id. A task must exist before it can
    /// be updated.
    #[error("Task not found: {id}")]
    NotFound { id: TaskId },

    /// The stored record does not decode as a task and cannot be updated.
    #[error("Stored record for task {id} is corrupt")]
    Corrupt { id: TaskId },

    /// Failed to serialize a task record.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
