//! Barcode aggregate and its scan log.

use chrono::{DateTime, Utc};
use cp_01_opcode::OpCode;
use serde::{Deserialize, Serialize};
use shared_types::{BarcodeCode, CourierId, EnvelopeId, LetterId};

/// Barcode lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeStatus {
    /// Issued, nothing attached yet.
    Unactivated,
    /// Bound to letter, envelope and recipient code.
    Bound,
    /// Picked up by a courier and moving.
    InTransit,
    /// Delivered; terminal.
    Delivered,
    /// Delivery failed; terminal.
    Failed,
    /// Cancelled; terminal.
    Cancelled,
}

impl BarcodeStatus {
    /// True for states no transition may leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Stable snake_case name, as used on the wire and in events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unactivated => "unactivated",
            Self::Bound => "bound",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BarcodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded courier interaction with a barcode. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub courier_id: CourierId,
    pub at_op_code: OpCode,
    pub new_status: BarcodeStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The barcode aggregate.
///
/// `letter_id` and `recipient_op_code` are non-null from `Bound` onward;
/// the transition table in [`super::state`] is the only way status moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barcode {
    pub code: BarcodeCode,
    pub status: BarcodeStatus,
    pub letter_id: Option<LetterId>,
    pub envelope_id: Option<EnvelopeId>,
    pub recipient_op_code: Option<OpCode>,
    /// Future-letter reveal time; delivery events are held until it passes.
    pub reveal_at: Option<DateTime<Utc>>,
    pub scan_log: Vec<ScanEvent>,
    pub created_at: DateTime<Utc>,
    pub bound_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
}

impl Barcode {
    /// A freshly issued, unbound barcode.
    #[must_use]
    pub fn issued(code: BarcodeCode, now: DateTime<Utc>) -> Self {
        Self {
            code,
            status: BarcodeStatus::Unactivated,
            letter_id: None,
            envelope_id: None,
            recipient_op_code: None,
            reveal_at: None,
            scan_log: Vec::new(),
            created_at: now,
            bound_at: None,
            last_transition_at: now,
        }
    }

    /// Timestamp of the newest scan, if any.
    #[must_use]
    pub fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.scan_log.last().map(|s| s.timestamp)
    }
}

/// What a printed QR encodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub version: u8,
    pub code: BarcodeCode,
    /// Masked hint of the bound destination, for sorting trays by hand.
    pub bound_op_hint: Option<String>,
}

/// Shared context for batch issuance.
///
/// Batch generation is the single-code path in a loop; the context carries
/// the batch identity and counters so audit lines can group the codes.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub batch_id: String,
    pub requested: u32,
    pub issued: u32,
}

impl GenerationContext {
    /// Start a batch of `requested` codes.
    #[must_use]
    pub fn batch(batch_id: impl Into<String>, requested: u32) -> Self {
        Self {
            batch_id: batch_id.into(),
            requested,
            issued: 0,
        }
    }

    /// A context for one-off issuance.
    #[must_use]
    pub fn single() -> Self {
        Self::batch("single", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(BarcodeStatus::Delivered.is_terminal());
        assert!(BarcodeStatus::Failed.is_terminal());
        assert!(BarcodeStatus::Cancelled.is_terminal());
        assert!(!BarcodeStatus::Unactivated.is_terminal());
        assert!(!BarcodeStatus::Bound.is_terminal());
        assert!(!BarcodeStatus::InTransit.is_terminal());
    }

    #[test]
    fn test_issued_barcode_is_blank() {
        let barcode = Barcode::issued(BarcodeCode::from("AB12CD34"), Utc::now());
        assert_eq!(barcode.status, BarcodeStatus::Unactivated);
        assert!(barcode.letter_id.is_none());
        assert!(barcode.scan_log.is_empty());
        assert!(barcode.last_scan_at().is_none());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(BarcodeStatus::InTransit.as_str(), "in_transit");
        let json = serde_json::to_string(&BarcodeStatus::InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
    }
}
