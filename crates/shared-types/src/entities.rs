//! Domain entities shared across subsystems.

use crate::ids::{EnvelopeId, LetterId, UserId};
use chrono::{DateTime, Utc};
use cp_01_opcode::OpCode;
use serde::{Deserialize, Serialize};

/// Platform roles carried by auth tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular letter-writing user.
    User,
    /// Approved courier (level carried separately).
    Courier,
    /// Platform administrator.
    Admin,
}

/// Courier tier. L1 is the street-level deliverer, L4 runs a school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CourierLevel {
    /// Delivers to a single 6-character point.
    L1,
    /// Operates an area (4-character prefix).
    L2,
    /// Coordinates areas within a school (4-character prefix).
    L3,
    /// Runs a school (2-character prefix).
    L4,
}

impl CourierLevel {
    /// Numeric tier, 1 through 4.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
            Self::L3 => 3,
            Self::L4 => 4,
        }
    }

    /// Build from a numeric tier.
    #[must_use]
    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            3 => Some(Self::L3),
            4 => Some(Self::L4),
            _ => None,
        }
    }

    /// The managed-prefix length convention for this tier.
    ///
    /// L1:6, L2:4, L3:4, L4:2. The L2 length is the documented default; the
    /// runtime exposes a configuration knob that the courier subsystem
    /// validates against.
    #[must_use]
    pub fn managed_prefix_len(&self) -> usize {
        match self {
            Self::L1 => 6,
            Self::L2 | Self::L3 => 4,
            Self::L4 => 2,
        }
    }

    /// The tier directly above, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        Self::from_rank(self.rank() + 1)
    }
}

/// External user identity as the core sees it.
///
/// The core never mutates users; this is a read model resolved from the
/// identity collaborator for permission decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    /// 2-character school code from the user's registration.
    pub school_code: String,
}

/// Letter visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterVisibility {
    Private,
    Public,
}

/// Letter lifecycle as the core tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    /// Written but not yet bound to a barcode.
    Draft,
    /// Bound to a barcode, moving through the pipeline.
    InDelivery,
    /// Physically delivered.
    Delivered,
    /// Marked for cleanup after sitting unbound too long.
    Expired,
}

/// A letter. Content is opaque to the core; only routing fields matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Letter {
    pub id: LetterId,
    pub author_id: UserId,
    /// Body as an opaque blob; the core neither indexes nor inspects it.
    pub content_opaque: String,
    pub sender_op_code: OpCode,
    /// Frozen once the letter is barcode-bound.
    pub recipient_op_code: Option<OpCode>,
    pub visibility: LetterVisibility,
    pub status: LetterStatus,
    pub created_at: DateTime<Utc>,
}

/// Envelope lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Purchased, nothing attached.
    Unsent,
    /// Bound to a barcode and letter.
    Bound,
    /// Delivery completed on this envelope.
    Used,
    Cancelled,
}

/// A physical envelope. At most one barcode and one letter ever attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub owner_user_id: UserId,
    pub barcode_code: Option<crate::ids::BarcodeCode>,
    pub letter_id: Option<LetterId>,
    pub status: EnvelopeStatus,
}
