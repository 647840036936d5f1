//! The [`OpCode`] value object.
//!
//! An `OpCode` is always 6 uppercase characters from `[A-Z0-9]`. Construction
//! goes through [`OpCode::parse`], so any held value is well-formed by
//! construction.

use crate::errors::OpCodeError;
use crate::prefix::OpCodePrefix;
use crate::{is_code_char, CODE_LEN};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A validated 6-character OP Code.
///
/// Stored inline as bytes; comparisons and hashing are byte-wise, so codes
/// are usable as map keys throughout the platform.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpCode([u8; CODE_LEN]);

impl OpCode {
    /// Parse a string into an `OpCode`.
    ///
    /// Accepts iff the input is exactly 6 characters of `[A-Z0-9]`.
    /// Lowercase input is rejected, not folded; the wire format is uppercase
    /// and the codec does not second-guess callers.
    pub fn parse(input: &str) -> Result<Self, OpCodeError> {
        let bytes = input.as_bytes();
        if bytes.len() != CODE_LEN || !bytes.iter().all(|&b| is_code_char(b)) {
            return Err(OpCodeError::MalformedCode {
                input: input.to_string(),
            });
        }
        let mut code = [0u8; CODE_LEN];
        code.copy_from_slice(bytes);
        Ok(Self(code))
    }

    /// The two-character school segment (`AA`).
    #[must_use]
    pub fn school(&self) -> &str {
        self.segment(0, 2)
    }

    /// The two-character area segment (`BB`).
    #[must_use]
    pub fn area(&self) -> &str {
        self.segment(2, 4)
    }

    /// The two-character point segment (`CC`).
    #[must_use]
    pub fn point(&self) -> &str {
        self.segment(4, 6)
    }

    /// The first `n` characters as a prefix, `n ∈ {2, 4, 6}`.
    pub fn prefix_of(&self, n: usize) -> Result<OpCodePrefix, OpCodeError> {
        if !crate::PREFIX_LENS.contains(&n) {
            return Err(OpCodeError::InvalidPrefixLen { len: n });
        }
        OpCodePrefix::parse(self.segment(0, n))
    }

    /// The full code as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Validated at construction: always ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    fn segment(&self, from: usize, to: usize) -> &str {
        std::str::from_utf8(&self.0[from..to]).unwrap_or_default()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCode({})", self.as_str())
    }
}

impl FromStr for OpCode {
    type Err = OpCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
