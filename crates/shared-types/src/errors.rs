//! Stable wire-level error codes.
//!
//! Subsystem crates define their own `thiserror` enums; everything that
//! reaches a client is folded into this one set so error codes stay stable
//! across refactors. HTTP statuses are derived here too, keeping the gateway
//! mapping table in a single place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by persistence adapters, shared by every repository port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A uniqueness or compare-and-set condition failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The backing store failed; retryable.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// The wire code this storage failure maps to.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Corrupt(_) => ErrorCode::Internal,
            Self::Backend(_) => ErrorCode::Transient,
        }
    }
}

/// Every error code a client can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation
    MalformedCode,
    BodyTooLarge,
    FieldRequired,

    // Auth
    TokenMissing,
    TokenInvalid,
    TokenExpired,
    PermissionDenied,

    // State
    AlreadyBound,
    AlreadyTerminal,
    InvalidTransition,
    AlreadyTaken,

    // Resource
    NotFound,
    Conflict,

    // Transport
    MessageTooLarge,
    SlowConsumer,
    DeadlineExceeded,

    // Infrastructure
    Transient,
    Unavailable,
    CircuitOpen,

    // Fallback for defects; never constructed deliberately.
    Internal,
}

impl ErrorCode {
    /// Numeric wire code. Grouped by hundreds per category; `0` is success
    /// and is never an `ErrorCode`.
    #[must_use]
    pub fn wire_code(&self) -> i32 {
        match self {
            Self::MalformedCode => 100,
            Self::BodyTooLarge => 101,
            Self::FieldRequired => 102,
            Self::TokenMissing => 200,
            Self::TokenInvalid => 201,
            Self::TokenExpired => 202,
            Self::PermissionDenied => 203,
            Self::AlreadyBound => 300,
            Self::AlreadyTerminal => 301,
            Self::InvalidTransition => 302,
            Self::AlreadyTaken => 303,
            Self::NotFound => 400,
            Self::Conflict => 401,
            Self::MessageTooLarge => 500,
            Self::SlowConsumer => 501,
            Self::DeadlineExceeded => 502,
            Self::Transient => 600,
            Self::Unavailable => 601,
            Self::CircuitOpen => 602,
            Self::Internal => 999,
        }
    }

    /// The HTTP status this code surfaces as.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MalformedCode | Self::FieldRequired => 400,
            Self::BodyTooLarge | Self::MessageTooLarge => 413,
            Self::TokenMissing | Self::TokenInvalid | Self::TokenExpired => 401,
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::AlreadyBound
            | Self::AlreadyTerminal
            | Self::InvalidTransition
            | Self::AlreadyTaken
            | Self::Conflict => 409,
            Self::DeadlineExceeded => 504,
            Self::SlowConsumer | Self::Transient | Self::Unavailable | Self::CircuitOpen => 503,
            Self::Internal => 500,
        }
    }

    /// Retryable from the client's point of view.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient | Self::Unavailable | Self::CircuitOpen | Self::DeadlineExceeded
        )
    }

    /// Stable string form used in envelopes and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedCode => "MalformedCode",
            Self::BodyTooLarge => "BodyTooLarge",
            Self::FieldRequired => "FieldRequired",
            Self::TokenMissing => "TokenMissing",
            Self::TokenInvalid => "TokenInvalid",
            Self::TokenExpired => "TokenExpired",
            Self::PermissionDenied => "PermissionDenied",
            Self::AlreadyBound => "AlreadyBound",
            Self::AlreadyTerminal => "AlreadyTerminal",
            Self::InvalidTransition => "InvalidTransition",
            Self::AlreadyTaken => "AlreadyTaken",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::MessageTooLarge => "MessageTooLarge",
            Self::SlowConsumer => "SlowConsumer",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Transient => "Transient",
            Self::Unavailable => "Unavailable",
            Self::CircuitOpen => "CircuitOpen",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 20] = [
        ErrorCode::MalformedCode,
        ErrorCode::BodyTooLarge,
        ErrorCode::FieldRequired,
        ErrorCode::TokenMissing,
        ErrorCode::TokenInvalid,
        ErrorCode::TokenExpired,
        ErrorCode::PermissionDenied,
        ErrorCode::AlreadyBound,
        ErrorCode::AlreadyTerminal,
        ErrorCode::InvalidTransition,
        ErrorCode::AlreadyTaken,
        ErrorCode::NotFound,
        ErrorCode::Conflict,
        ErrorCode::MessageTooLarge,
        ErrorCode::SlowConsumer,
        ErrorCode::DeadlineExceeded,
        ErrorCode::Transient,
        ErrorCode::Unavailable,
        ErrorCode::CircuitOpen,
        ErrorCode::Internal,
    ];

    #[test]
    fn test_wire_codes_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.wire_code()), "duplicate: {code}");
        }
    }

    #[test]
    fn test_success_code_reserved() {
        for code in ALL {
            assert_ne!(code.wire_code(), 0);
        }
    }

    #[test]
    fn test_retryable_set() {
        assert!(ErrorCode::Transient.is_retryable());
        assert!(ErrorCode::CircuitOpen.is_retryable());
        assert!(!ErrorCode::PermissionDenied.is_retryable());
        assert!(!ErrorCode::AlreadyTaken.is_retryable());
    }
}
