//! Lazy enumeration of all codes under a prefix.
//!
//! Used by batch barcode generation to walk every point in an area or school.
//! The expansion is an iterator, never a materialized vector: a 2-character
//! prefix spans 36^4 = 1,679,616 codes.

use crate::code::OpCode;
use crate::prefix::OpCodePrefix;
use crate::{ALPHABET, CODE_LEN};

/// Lazy iterator over every 6-character code under a prefix.
///
/// Codes are yielded in alphabet order (`A..Z` then `0..9` per position).
/// A full 6-character prefix yields exactly its own code once.
#[derive(Debug, Clone)]
pub struct RangeExpand {
    base: OpCodePrefix,
    /// Odometer over the free positions, as indexes into [`ALPHABET`].
    counters: Vec<usize>,
    exhausted: bool,
}

impl RangeExpand {
    /// Start an expansion under `prefix`.
    #[must_use]
    pub fn new(prefix: OpCodePrefix) -> Self {
        let free = CODE_LEN - prefix.len();
        Self {
            base: prefix,
            counters: vec![0; free],
            exhausted: false,
        }
    }

    /// Number of codes this expansion will yield in total.
    #[must_use]
    pub fn total(&self) -> u64 {
        (ALPHABET.len() as u64).pow((CODE_LEN - self.base.len()) as u32)
    }

    fn current(&self) -> Option<OpCode> {
        let mut s = String::with_capacity(CODE_LEN);
        s.push_str(self.base.as_str());
        for &idx in &self.counters {
            s.push(ALPHABET[idx] as char);
        }
        OpCode::parse(&s).ok()
    }

    fn advance(&mut self) {
        // Rightmost position ticks fastest.
        for slot in self.counters.iter_mut().rev() {
            *slot += 1;
            if *slot < ALPHABET.len() {
                return;
            }
            *slot = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for RangeExpand {
    type Item = OpCode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.current();
        self.advance();
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_prefix_yields_itself() {
        let prefix = OpCodePrefix::parse("PK5F3D").unwrap();
        let codes: Vec<_> = RangeExpand::new(prefix).collect();
        assert_eq!(codes, vec![OpCode::parse("PK5F3D").unwrap()]);
    }

    #[test]
    fn test_area_prefix_count_and_order() {
        let prefix = OpCodePrefix::parse("PK5F").unwrap();
        let expand = RangeExpand::new(prefix);
        assert_eq!(expand.total(), 36 * 36);

        let codes: Vec<_> = expand.collect();
        assert_eq!(codes.len(), 36 * 36);
        assert_eq!(codes[0].as_str(), "PK5FAA");
        assert_eq!(codes[1].as_str(), "PK5FAB");
        assert_eq!(codes.last().map(OpCode::as_str), Some("PK5F99"));
    }

    #[test]
    fn test_expansion_is_lazy() {
        let prefix = OpCodePrefix::parse("PK").unwrap();
        let mut expand = RangeExpand::new(prefix);
        assert_eq!(expand.total(), 1_679_616);
        // Take a handful without walking the whole space.
        assert_eq!(expand.next().map(|c| c.to_string()), Some("PKAAAA".into()));
        assert_eq!(expand.next().map(|c| c.to_string()), Some("PKAAAB".into()));
    }

    #[test]
    fn test_every_yielded_code_is_covered() {
        let prefix = OpCodePrefix::parse("QH1A").unwrap();
        for code in RangeExpand::new(prefix).take(100) {
            assert!(prefix.covers(&code));
        }
    }
}
