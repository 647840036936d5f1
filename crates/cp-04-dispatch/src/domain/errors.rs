//! Dispatch subsystem errors.

use super::entities::{ScanKind, TaskStatus};
use shared_types::{ErrorCode, StorageError};
use thiserror::Error;

/// Errors from task operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Unknown task.
    #[error("task not found: {id}")]
    NotFound { id: String },

    /// Another courier won the accept race.
    #[error("task already taken")]
    AlreadyTaken,

    /// The scan kind does not apply in the task's current status.
    #[error("scan {kind:?} not valid while task is {status}")]
    WrongStage { kind: ScanKind, status: TaskStatus },

    /// The scan happened at the wrong place for this kind.
    #[error("scan at {at} but {kind:?} expects {expected}")]
    WrongLocation {
        kind: ScanKind,
        at: String,
        expected: String,
    },

    /// Scan location outside the courier's managed prefix. The gateway
    /// masks this as `NotFound` for non-covering couriers.
    #[error("scan location {at} outside managed prefix {prefix}")]
    OutsideScope { at: String, prefix: String },

    /// The scanning courier does not hold this task.
    #[error("task is assigned to a different courier")]
    NotAssignee,

    /// Task already reached a terminal status.
    #[error("task is terminal in state {status}")]
    AlreadyTerminal { status: TaskStatus },

    /// The referenced barcode is malformed or unknown.
    #[error("invalid barcode: {code}")]
    InvalidBarcode { code: String },

    /// The coupled barcode transition failed.
    #[error("barcode transition failed: {message}")]
    BarcodeRejected { code: ErrorCode, message: String },

    /// No courier covers the delivery code.
    #[error("no active courier covers {code}")]
    NoCandidates { code: String },

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DispatchError {
    /// Map to the stable wire code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyTaken => ErrorCode::AlreadyTaken,
            Self::WrongStage { .. } | Self::WrongLocation { .. } => ErrorCode::InvalidTransition,
            Self::OutsideScope { .. } | Self::NotAssignee => ErrorCode::PermissionDenied,
            Self::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
            Self::InvalidBarcode { .. } => ErrorCode::MalformedCode,
            Self::BarcodeRejected { code, .. } => *code,
            Self::NoCandidates { .. } => ErrorCode::Unavailable,
            Self::Storage(e) => e.error_code(),
        }
    }
}
