//! Permission kernel errors.

use shared_types::ErrorCode;
use thiserror::Error;

/// Errors from authentication and authorization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token on the request.
    #[error("authorization token missing")]
    TokenMissing,

    /// Signature or structure invalid.
    #[error("authorization token invalid")]
    TokenInvalid,

    /// Token expiry passed.
    #[error("authorization token expired")]
    TokenExpired,

    /// Authenticated but not allowed.
    #[error("permission denied for {operation}")]
    PermissionDenied { operation: &'static str },

    /// Masked form of a permission failure on an OP-scoped resource.
    #[error("resource not found")]
    MaskedNotFound,
}

impl AuthError {
    /// Map to the stable wire code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::TokenMissing => ErrorCode::TokenMissing,
            Self::TokenInvalid => ErrorCode::TokenInvalid,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::MaskedNotFound => ErrorCode::NotFound,
        }
    }
}
