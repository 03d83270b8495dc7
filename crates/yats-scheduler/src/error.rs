use thiserror::Error;
use yats_store::StoreError;

/// Errors surfaced by the scheduling surface.
///
/// Handler failures are deliberately absent: a failed handler is recorded on
/// the task itself (`state = error` + `errMsg`) for the producer to observe
/// via query, never raised to a caller.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed caller input — missing scheduled time, conflicting or empty
    /// query criteria. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Storage failure, surfaced to the immediate caller. The dispatch
    /// engine logs these and keeps polling.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
