//! Privacy masking of OP Codes.
//!
//! Masking is centralized here; serialization layers call [`mask`] with the
//! viewer's scope instead of hand-rolling star patterns. Masked positions are
//! written as `*` on the wire.

use crate::code::OpCode;

/// How much of a code a viewer is entitled to see.
///
/// Couriers pass their level; everyone else is [`ViewerScope::External`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerScope {
    /// Non-courier viewer: school segment only.
    External,
    /// Courier level 1: school + area visible, point masked.
    CourierL1,
    /// Courier level 2: school only.
    CourierL2,
    /// Courier level 3: full code.
    CourierL3,
    /// Courier level 4: full code.
    CourierL4,
}

impl ViewerScope {
    /// Build a scope from a courier level, or `External` when none.
    #[must_use]
    pub fn from_courier_level(level: Option<u8>) -> Self {
        match level {
            Some(1) => Self::CourierL1,
            Some(2) => Self::CourierL2,
            Some(3) => Self::CourierL3,
            Some(l) if l >= 4 => Self::CourierL4,
            _ => Self::External,
        }
    }

    /// Number of leading characters this scope may see.
    #[must_use]
    pub fn visible_chars(&self) -> usize {
        match self {
            Self::External | Self::CourierL2 => 2,
            Self::CourierL1 => 4,
            Self::CourierL3 | Self::CourierL4 => 6,
        }
    }
}

/// Render `code` for a viewer, writing `*` at masked positions.
///
/// L1 sees `AAAA**`, L2 and externals see `AA****`, L3/L4 see the full code.
#[must_use]
pub fn mask(code: &OpCode, viewer: ViewerScope) -> String {
    let visible = viewer.visible_chars();
    let mut out = String::with_capacity(crate::CODE_LEN);
    for (i, ch) in code.as_str().chars().enumerate() {
        if i < visible {
            out.push(ch);
        } else {
            out.push('*');
        }
    }
    out
}
