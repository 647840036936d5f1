//! Courier records and approval bookkeeping.

use chrono::{DateTime, Utc};
use cp_01_opcode::OpCodePrefix;
use serde::{Deserialize, Serialize};
use shared_types::{CourierId, CourierLevel, UserId};

/// Courier lifecycle. Records are soft-status only, never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    /// Applied or created, awaiting review.
    Pending,
    /// Active.
    Approved,
    /// Review declined.
    Rejected,
    /// Temporarily barred from accepting tasks.
    Suspended,
}

impl CourierStatus {
    /// Stable snake_case name used in events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        }
    }
}

/// What an approval record attests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// Review of a pending application.
    Application,
    /// Parental consent for a managed-prefix narrowing.
    PrefixNarrowing,
    /// Sign-off on a promotion.
    Promotion,
}

/// A reviewer's recorded decision. Append-only per courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub reviewer_id: CourierId,
    pub kind: ApprovalKind,
    pub approved: bool,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Delivery statistics driving ranking and promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerformanceCounters {
    pub delivered: u32,
    pub failed: u32,
    /// Timestamp of the most recent task assignment, for fair rotation.
    pub last_assignment_at: Option<DateTime<Utc>>,
}

/// A courier record.
///
/// `parent_courier_id` points one tier up; the root of a school tree (L4)
/// has no parent. Cross-references to tasks go by ID through the dispatch
/// subsystem, never by object reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courier {
    pub id: CourierId,
    pub user_id: UserId,
    pub level: CourierLevel,
    pub managed_prefix: OpCodePrefix,
    pub parent_courier_id: Option<CourierId>,
    pub status: CourierStatus,
    pub counters: PerformanceCounters,
    pub approvals: Vec<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
}

impl Courier {
    /// True iff this courier may currently operate (accept tasks, scan).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CourierStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(CourierStatus::Pending.as_str(), "pending");
        assert_eq!(CourierStatus::Suspended.as_str(), "suspended");
    }

    #[test]
    fn test_only_approved_is_active() {
        let mut courier = Courier {
            id: CourierId::from("C1"),
            user_id: UserId::from("U1"),
            level: CourierLevel::L1,
            managed_prefix: OpCodePrefix::parse("PK5F3D").unwrap(),
            parent_courier_id: None,
            status: CourierStatus::Pending,
            counters: PerformanceCounters::default(),
            approvals: Vec::new(),
            created_at: Utc::now(),
        };
        assert!(!courier.is_active());
        courier.status = CourierStatus::Approved;
        assert!(courier.is_active());
        courier.status = CourierStatus::Suspended;
        assert!(!courier.is_active());
    }
}
