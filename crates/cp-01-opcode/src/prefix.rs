//! The [`OpCodePrefix`] value object and containment checks.
//!
//! A prefix is the authority unit of the courier hierarchy: a 2-character
//! prefix scopes a school, 4 characters an area, 6 characters a single
//! point. `covers` is the one containment primitive every permission check
//! in the platform reduces to.

use crate::code::OpCode;
use crate::errors::OpCodeError;
use crate::{is_code_char, CODE_LEN, PREFIX_LENS};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A validated OP Code prefix of length 2, 4 or 6.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpCodePrefix {
    bytes: [u8; CODE_LEN],
    len: u8,
}

impl OpCodePrefix {
    /// Parse a string into a prefix.
    ///
    /// Accepts iff the input is 2, 4 or 6 characters of `[A-Z0-9]`.
    pub fn parse(input: &str) -> Result<Self, OpCodeError> {
        let raw = input.as_bytes();
        if !PREFIX_LENS.contains(&raw.len()) || !raw.iter().all(|&b| is_code_char(b)) {
            return Err(OpCodeError::MalformedPrefix {
                input: input.to_string(),
            });
        }
        let mut bytes = [0u8; CODE_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Prefix length in characters: 2, 4 or 6.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Prefixes are never empty; provided for clippy's sake.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The prefix as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len()]).unwrap_or_default()
    }

    /// True iff `code` starts with this prefix.
    #[must_use]
    pub fn covers(&self, code: &OpCode) -> bool {
        code.as_str().as_bytes()[..self.len()] == self.bytes[..self.len()]
    }

    /// True iff `other` is this prefix or an extension of it.
    ///
    /// `PK` contains `PK`, `PK5F` and `PK5F3D`; `PK5F` does not contain `PK`.
    #[must_use]
    pub fn contains_prefix(&self, other: &OpCodePrefix) -> bool {
        other.len() >= self.len() && other.bytes[..self.len()] == self.bytes[..self.len()]
    }

    /// Truncate to the first `n` characters, `n ∈ {2, 4, 6}` and `n ≤ len`.
    pub fn truncate(&self, n: usize) -> Result<OpCodePrefix, OpCodeError> {
        if !PREFIX_LENS.contains(&n) || n > self.len() {
            return Err(OpCodeError::InvalidPrefixLen { len: n });
        }
        OpCodePrefix::parse(&self.as_str()[..n])
    }

    /// The exact code this prefix denotes, if it is a full 6-character prefix.
    #[must_use]
    pub fn as_exact_code(&self) -> Option<OpCode> {
        if self.len() == CODE_LEN {
            OpCode::parse(self.as_str()).ok()
        } else {
            None
        }
    }
}

impl From<OpCode> for OpCodePrefix {
    fn from(code: OpCode) -> Self {
        // A full code is always a valid 6-char prefix.
        let mut bytes = [0u8; CODE_LEN];
        bytes.copy_from_slice(code.as_str().as_bytes());
        Self {
            bytes,
            len: CODE_LEN as u8,
        }
    }
}

impl fmt::Display for OpCodePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for OpCodePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCodePrefix({})", self.as_str())
    }
}

impl FromStr for OpCodePrefix {
    type Err = OpCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OpCodePrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OpCodePrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid_prefixes() {
        for p in ["PK", "PK5F", "PK5F3D"] {
            assert_eq!(OpCodePrefix::parse(p).unwrap().as_str(), p);
        }
    }

    #[test]
    fn test_parse_rejects_odd_lengths() {
        for p in ["P", "PK5", "PK5F3", "PK5F3DA"] {
            assert!(OpCodePrefix::parse(p).is_err(), "{p} should be rejected");
        }
    }

    #[test]
    fn test_covers() {
        let code = OpCode::parse("PK5F3D").unwrap();
        assert!(OpCodePrefix::parse("PK").unwrap().covers(&code));
        assert!(OpCodePrefix::parse("PK5F").unwrap().covers(&code));
        assert!(OpCodePrefix::parse("PK5F3D").unwrap().covers(&code));
        assert!(!OpCodePrefix::parse("QH").unwrap().covers(&code));
        assert!(!OpCodePrefix::parse("PK5A").unwrap().covers(&code));
    }

    #[test]
    fn test_contains_prefix() {
        let school = OpCodePrefix::parse("PK").unwrap();
        let area = OpCodePrefix::parse("PK5F").unwrap();
        let point = OpCodePrefix::parse("PK5F3D").unwrap();

        assert!(school.contains_prefix(&school));
        assert!(school.contains_prefix(&area));
        assert!(school.contains_prefix(&point));
        assert!(!area.contains_prefix(&school));
        assert!(!OpCodePrefix::parse("QH").unwrap().contains_prefix(&area));
    }

    #[test]
    fn test_truncate() {
        let area = OpCodePrefix::parse("PK5F").unwrap();
        assert_eq!(area.truncate(2).unwrap().as_str(), "PK");
        assert!(area.truncate(6).is_err());
        assert!(area.truncate(3).is_err());
    }

    #[test]
    fn test_as_exact_code() {
        assert!(OpCodePrefix::parse("PK5F").unwrap().as_exact_code().is_none());
        assert_eq!(
            OpCodePrefix::parse("PK5F3D").unwrap().as_exact_code(),
            Some(OpCode::parse("PK5F3D").unwrap())
        );
    }

    proptest! {
        /// Prefix monotonicity: if p covers c and p ⊑ p', then p' covers c
        /// iff p' is itself a prefix of c.
        #[test]
        fn prop_prefix_monotonicity(code in "[A-Z0-9]{6}", n in 0usize..3, m in 0usize..3) {
            let code = OpCode::parse(&code).unwrap();
            let (short, long) = {
                let a = PREFIX_LENS[n.min(m)];
                let b = PREFIX_LENS[n.max(m)];
                (code.prefix_of(a).unwrap(), code.prefix_of(b).unwrap())
            };
            prop_assert!(short.contains_prefix(&long));
            prop_assert!(short.covers(&code));
            prop_assert!(long.covers(&code));
        }

        /// Any prefix of a well-formed code is itself well-formed.
        #[test]
        fn prop_any_prefix_well_formed(code in "[A-Z0-9]{6}") {
            let code = OpCode::parse(&code).unwrap();
            for n in PREFIX_LENS {
                prop_assert!(code.prefix_of(n).is_ok());
            }
        }
    }
}
