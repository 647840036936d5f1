//! Courier task records and scan inputs.

use chrono::{DateTime, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use serde::{Deserialize, Serialize};
use shared_types::{BarcodeCode, CourierId, TaskId};

/// Task lifecycle. Advances monotonically; terminal states mirror the
/// barcode's terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Announced in a prefix room, unclaimed.
    Available,
    /// Claimed by a courier, not yet picked up.
    Accepted,
    /// Picked up at the sender's location.
    Collected,
    /// Moving toward the recipient.
    InTransit,
    /// Terminal: handed over.
    Delivered,
    /// Terminal: given up.
    Failed,
}

impl TaskStatus {
    /// True for states no scan may leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Stable snake_case name used on the wire and in events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Accepted => "accepted",
            Self::Collected => "collected",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority, set at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    Normal,
    Urgent,
    Express,
}

/// The kinds of courier scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Collect the envelope at the pickup code.
    Pickup,
    /// Progress checkpoint inside the courier's own prefix.
    Transit,
    /// Pass the envelope toward the next hop.
    Handoff,
    /// Hand over at the delivery code.
    Deliver,
    /// Abandon the delivery.
    Fail,
}

impl ScanKind {
    /// Name used in hints and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Transit => "transit",
            Self::Handoff => "handoff",
            Self::Deliver => "deliver",
            Self::Fail => "fail",
        }
    }
}

/// A courier delivery task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierTask {
    pub id: TaskId,
    pub barcode_code: BarcodeCode,
    pub pickup_op_code: OpCode,
    pub delivery_op_code: OpCode,
    /// Last known location of the envelope; starts at pickup, moves on
    /// handoffs.
    pub current_op_code: OpCode,
    pub assigned_courier_id: Option<CourierId>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Reassignment count; incremented each time the task times out back to
    /// `available`.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the 48-hour reminder last fired, to keep the hourly sweep from
    /// repeating it.
    pub reminded_at: Option<DateTime<Utc>>,
}

impl CourierTask {
    /// A freshly created, unclaimed task.
    #[must_use]
    pub fn announced(
        id: TaskId,
        barcode_code: BarcodeCode,
        pickup: OpCode,
        delivery: OpCode,
        priority: TaskPriority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            barcode_code,
            pickup_op_code: pickup,
            delivery_op_code: delivery,
            current_op_code: pickup,
            assigned_courier_id: None,
            priority,
            status: TaskStatus::Available,
            attempts: 0,
            created_at: now,
            accepted_at: None,
            reminded_at: None,
        }
    }
}

/// The courier driving a scan, as dispatch needs to see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanActor {
    pub courier_id: CourierId,
    pub level_rank: u8,
    pub managed_prefix: OpCodePrefix,
}

/// One scan submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub kind: ScanKind,
    pub at_op_code: OpCode,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

/// The hint returned by `next_action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    /// What the courier should do next (a [`ScanKind`] name, or `accept`).
    pub action: String,
    /// Where that action is expected to happen.
    pub expected_op_code: OpCode,
    /// Estimated seconds until completion, from rolling averages of
    /// equivalent transitions. Absent until enough history accumulates.
    pub eta_secs: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Delivered.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Available.is_terminal());
        assert!(!TaskStatus::InTransit.is_terminal());
    }

    #[test]
    fn test_announced_task_shape() {
        let task = CourierTask::announced(
            TaskId::from("T1"),
            BarcodeCode::from("AB12CD34"),
            OpCode::parse("PK5F3D").unwrap(),
            OpCode::parse("PK5F2A").unwrap(),
            TaskPriority::Normal,
            Utc::now(),
        );
        assert_eq!(task.status, TaskStatus::Available);
        assert_eq!(task.current_op_code, task.pickup_op_code);
        assert!(task.assigned_courier_id.is_none());
        assert_eq!(task.attempts, 0);
    }
}
