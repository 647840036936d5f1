//! Barcode subsystem errors.

use super::entities::BarcodeStatus;
use shared_types::{ErrorCode, StorageError};
use thiserror::Error;

/// Errors from barcode operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BarcodeError {
    /// The barcode, letter or envelope already carries a binding.
    #[error("already bound: {what}")]
    AlreadyBound { what: String },

    /// Recipient code failed validation.
    #[error("invalid OP code: {input}")]
    InvalidCode { input: String },

    /// Operation requires a different lifecycle state.
    #[error("invalid state: {status} cannot accept {operation}")]
    InvalidState {
        status: BarcodeStatus,
        operation: &'static str,
    },

    /// The requested status change is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: BarcodeStatus,
        to: BarcodeStatus,
    },

    /// The barcode already reached a terminal state.
    #[error("barcode is terminal in state {status}")]
    AlreadyTerminal { status: BarcodeStatus },

    /// Cancelling an in-transit barcode requires courier level 3 or above.
    #[error("cancel of in-transit barcode requires level 3+, actor is level {actor_level}")]
    CancelRequiresSenior { actor_level: u8 },

    /// Scan timestamps must advance strictly per barcode.
    #[error("scan timestamp does not advance past the previous scan")]
    NonMonotonicScan,

    /// No unused code could be drawn from the code space.
    #[error("code generation exhausted after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Unknown barcode.
    #[error("barcode not found: {code}")]
    NotFound { code: String },

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BarcodeError {
    /// Map to the stable wire code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::AlreadyBound { .. } => ErrorCode::AlreadyBound,
            Self::InvalidCode { .. } => ErrorCode::MalformedCode,
            Self::InvalidState { .. } | Self::InvalidTransition { .. } => {
                ErrorCode::InvalidTransition
            }
            Self::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
            Self::CancelRequiresSenior { .. } => ErrorCode::PermissionDenied,
            Self::NonMonotonicScan => ErrorCode::Conflict,
            Self::CodeSpaceExhausted { .. } => ErrorCode::Unavailable,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Storage(e) => e.error_code(),
        }
    }
}
