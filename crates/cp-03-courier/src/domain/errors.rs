//! Courier subsystem errors.

use shared_types::{ErrorCode, StorageError};
use thiserror::Error;

/// Errors from hierarchy operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CourierError {
    /// Unknown courier.
    #[error("courier not found: {id}")]
    NotFound { id: String },

    /// Creator is not exactly one tier above the new courier.
    #[error("level {creator_level} cannot create level {target_level} couriers")]
    WrongCreatorLevel {
        creator_level: u8,
        target_level: u8,
    },

    /// Reviewer outranked by the rule `reviewer.level >= courier.level + 1`.
    #[error("level {reviewer_level} cannot review a level {target_level} courier")]
    ReviewerOutranked {
        reviewer_level: u8,
        target_level: u8,
    },

    /// The proposed prefix is not contained in the creator's prefix.
    #[error("prefix {prefix} is outside the creator's managed prefix {managed}")]
    PrefixOutsideScope { prefix: String, managed: String },

    /// The prefix length does not match the level convention.
    #[error("prefix {prefix} has length {actual}, level requires {expected}")]
    PrefixLengthMismatch {
        prefix: String,
        actual: usize,
        expected: usize,
    },

    /// An equal-length claim on this prefix already exists at this level.
    #[error("prefix {prefix} already claimed at this level")]
    PrefixAlreadyClaimed { prefix: String },

    /// Operation requires a different courier status.
    #[error("courier {id} is {status}, operation requires {required}")]
    WrongStatus {
        id: String,
        status: &'static str,
        required: &'static str,
    },

    /// Promotion thresholds not met.
    #[error("performance score {score} below promotion threshold {threshold}")]
    BelowThreshold { score: i64, threshold: i64 },

    /// Narrowing a managed prefix requires the parent's recorded consent.
    #[error("prefix narrowing requires parental consent")]
    ConsentRequired,

    /// The top tier cannot be promoted further.
    #[error("courier is already at the top level")]
    AtTopLevel,

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CourierError {
    /// Map to the stable wire code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::WrongCreatorLevel { .. }
            | Self::ReviewerOutranked { .. }
            | Self::PrefixOutsideScope { .. }
            | Self::ConsentRequired => ErrorCode::PermissionDenied,
            Self::PrefixLengthMismatch { .. } => ErrorCode::MalformedCode,
            Self::PrefixAlreadyClaimed { .. } => ErrorCode::Conflict,
            Self::WrongStatus { .. } | Self::BelowThreshold { .. } | Self::AtTopLevel => {
                ErrorCode::InvalidTransition
            }
            Self::Storage(e) => e.error_code(),
        }
    }
}
