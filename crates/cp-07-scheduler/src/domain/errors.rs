//! Scheduler errors.

use shared_types::{ErrorCode, StorageError};
use thiserror::Error;

/// Errors from scheduler operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Unknown task.
    #[error("scheduled task not found: {id}")]
    NotFound { id: String },

    /// Cron expression failed to parse or has no future occurrence.
    #[error("unusable cron expression: {expr}")]
    BadCron { expr: String },

    /// No handler registered for a task type.
    #[error("no handler registered for task type {task_type}")]
    HandlerMissing { task_type: String },

    /// The task-type circuit is open; execution was not attempted.
    #[error("circuit open for task type {task_type}")]
    CircuitOpen { task_type: String },

    /// A terminal task cannot be modified.
    #[error("task is terminal")]
    AlreadyTerminal,

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SchedulerError {
    /// Map to the stable wire code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::BadCron { .. } => ErrorCode::FieldRequired,
            Self::HandlerMissing { .. } => ErrorCode::Unavailable,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::AlreadyTerminal => ErrorCode::AlreadyTerminal,
            Self::Storage(e) => e.error_code(),
        }
    }
}
