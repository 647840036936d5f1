//! Errors produced by OP Code parsing and prefix handling.

use thiserror::Error;

/// Errors that can occur when parsing or slicing OP Codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpCodeError {
    /// Input is not a well-formed 6-character OP Code.
    #[error("malformed OP code: {input:?}")]
    MalformedCode { input: String },

    /// Input is not a well-formed prefix (length must be 2, 4 or 6).
    #[error("malformed OP code prefix: {input:?}")]
    MalformedPrefix { input: String },

    /// A prefix slice was requested at an unsupported length.
    #[error("invalid prefix length {len}, expected 2, 4 or 6")]
    InvalidPrefixLen { len: usize },
}
