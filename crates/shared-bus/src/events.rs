//! # Platform Events
//!
//! Defines all event types that flow through the shared bus. Each event
//! names the aggregate it concerns; payloads carry IDs, never live objects,
//! so no subscriber can mutate another subsystem's state.

use chrono::{DateTime, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use serde::{Deserialize, Serialize};
use shared_types::{
    BarcodeCode, CourierId, EnvelopeId, LetterId, RequestId, ScheduledTaskId, TaskId, UserId,
};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlatformEvent {
    // =========================================================================
    // BARCODE LIFECYCLE (cp-02)
    // =========================================================================
    /// A barcode was bound to a letter, envelope and recipient code.
    /// This is the trigger that starts courier task creation in cp-04.
    BarcodeBound {
        code: BarcodeCode,
        letter_id: LetterId,
        envelope_id: EnvelopeId,
        sender_op_code: OpCode,
        recipient_op_code: OpCode,
        /// Optional future-letter reveal time; the scheduler's unlock job
        /// holds delivery events until this passes.
        reveal_at: Option<DateTime<Utc>>,
    },

    /// A barcode moved through its state machine.
    /// Consumed by cp-06 for `LETTER_STATUS_UPDATE` fan-out.
    BarcodeTransitioned {
        code: BarcodeCode,
        letter_id: LetterId,
        from_status: String,
        to_status: String,
        at_op_code: Option<OpCode>,
        courier_id: Option<CourierId>,
    },

    /// A future letter's reveal time passed; delivery may proceed.
    /// Emitted by the scheduler's `future_letter_unlock` job.
    FutureLetterUnlocked {
        code: BarcodeCode,
        letter_id: LetterId,
    },

    // =========================================================================
    // DISPATCH (cp-04)
    // =========================================================================
    /// A task became available in a prefix room; first accept wins.
    TaskPublished {
        task_id: TaskId,
        barcode_code: BarcodeCode,
        pickup_op_code: OpCode,
        delivery_op_code: OpCode,
        /// The prefix room the task was announced in.
        announce_prefix: OpCodePrefix,
    },

    /// A courier won the accept race for a task.
    TaskAccepted {
        task_id: TaskId,
        courier_id: CourierId,
    },

    /// A task timed out and was returned to the available pool.
    TaskReassigned {
        task_id: TaskId,
        previous_courier_id: CourierId,
        attempts: u32,
        announce_prefix: OpCodePrefix,
    },

    /// A task reached a terminal status.
    TaskClosed {
        task_id: TaskId,
        barcode_code: BarcodeCode,
        final_status: String,
    },

    // =========================================================================
    // COURIER HIERARCHY (cp-03)
    // =========================================================================
    /// A courier's status changed (applied, approved, rejected, suspended).
    CourierStatusChanged {
        courier_id: CourierId,
        user_id: UserId,
        new_status: String,
    },

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================
    /// A user-directed notification to be fanned out by the hub.
    NotificationRequested {
        user_id: UserId,
        title: String,
        body: String,
    },

    // =========================================================================
    // SCHEDULER (cp-07)
    // =========================================================================
    /// A scheduled task exhausted its retries or hit a permanent error.
    TaskDeadLettered {
        scheduled_task_id: ScheduledTaskId,
        task_type: String,
        error: String,
    },
}

impl PlatformEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BarcodeBound { .. }
            | Self::BarcodeTransitioned { .. }
            | Self::FutureLetterUnlocked { .. } => EventTopic::Barcode,
            Self::TaskPublished { .. }
            | Self::TaskAccepted { .. }
            | Self::TaskReassigned { .. }
            | Self::TaskClosed { .. } => EventTopic::Dispatch,
            Self::CourierStatusChanged { .. } => EventTopic::Courier,
            Self::NotificationRequested { .. } => EventTopic::Notification,
            Self::TaskDeadLettered { .. } => EventTopic::DeadLetter,
        }
    }

    /// The aggregate the event concerns, as a string key.
    #[must_use]
    pub fn aggregate_id(&self) -> String {
        match self {
            Self::BarcodeBound { code, .. }
            | Self::BarcodeTransitioned { code, .. }
            | Self::FutureLetterUnlocked { code, .. } => code.to_string(),
            Self::TaskPublished { task_id, .. }
            | Self::TaskAccepted { task_id, .. }
            | Self::TaskReassigned { task_id, .. }
            | Self::TaskClosed { task_id, .. } => task_id.to_string(),
            Self::CourierStatusChanged { courier_id, .. } => courier_id.to_string(),
            Self::NotificationRequested { user_id, .. } => user_id.to_string(),
            Self::TaskDeadLettered {
                scheduled_task_id, ..
            } => scheduled_task_id.to_string(),
        }
    }
}

/// A published event plus its bus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event: PlatformEvent,
    pub emitted_at: DateTime<Utc>,
    /// Request that caused the emission, when there was one.
    pub request_id: Option<RequestId>,
}

impl PublishedEvent {
    /// Wrap an event with bus metadata.
    #[must_use]
    pub fn new(event: PlatformEvent, request_id: Option<RequestId>) -> Self {
        Self {
            event,
            emitted_at: Utc::now(),
            request_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Barcode lifecycle events (cp-02).
    Barcode,
    /// Task creation/acceptance/closure (cp-04).
    Dispatch,
    /// Courier hierarchy changes (cp-03).
    Courier,
    /// User-directed notifications.
    Notification,
    /// Scheduler dead letters.
    DeadLetter,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &PlatformEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_event() -> PlatformEvent {
        PlatformEvent::BarcodeBound {
            code: BarcodeCode::from("AB12CD34"),
            letter_id: LetterId::from("L1"),
            envelope_id: EnvelopeId::from("E1"),
            sender_op_code: OpCode::parse("PK5F3D").unwrap(),
            recipient_op_code: OpCode::parse("PK5F2A").unwrap(),
            reveal_at: None,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(bound_event().topic(), EventTopic::Barcode);
        let closed = PlatformEvent::TaskClosed {
            task_id: TaskId::from("T1"),
            barcode_code: BarcodeCode::from("AB12CD34"),
            final_status: "delivered".into(),
        };
        assert_eq!(closed.topic(), EventTopic::Dispatch);
    }

    #[test]
    fn test_aggregate_id() {
        assert_eq!(bound_event().aggregate_id(), "AB12CD34");
    }

    #[test]
    fn test_filter_all() {
        assert!(EventFilter::all().matches(&bound_event()));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Dispatch]);
        assert!(!filter.matches(&bound_event()));

        let accepted = PlatformEvent::TaskAccepted {
            task_id: TaskId::from("T1"),
            courier_id: CourierId::from("C1"),
        };
        assert!(filter.matches(&accepted));
    }

    #[test]
    fn test_published_event_metadata() {
        let published = PublishedEvent::new(bound_event(), Some(RequestId::from_header("r-1")));
        assert_eq!(published.request_id.as_ref().map(|r| r.as_str()), Some("r-1"));
    }
}
