//! Scheduled task records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared_types::ScheduledTaskId;
use std::str::FromStr;

/// When a task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// Recurring, driven by a cron expression (seconds-resolution, 6 or 7
    /// fields). The task re-arms itself after every execution.
    Cron(String),
    /// One-shot at an absolute time.
    At(DateTime<Utc>),
    /// One-shot after a relative delay in seconds.
    After(u64),
}

impl Schedule {
    /// The first fire time at or after `now`.
    ///
    /// Returns `None` for an unparsable cron expression or one with no
    /// future occurrence.
    #[must_use]
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(expr) => cron::Schedule::from_str(expr)
                .ok()?
                .after(&now)
                .next(),
            Self::At(at) => Some(*at),
            Self::After(secs) => Some(now + Duration::seconds(*secs as i64)),
        }
    }

    /// The next fire time after an execution, for recurring schedules only.
    #[must_use]
    pub fn next_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(_) => self.first_fire(now),
            Self::At(_) | Self::After(_) => None,
        }
    }

    /// True for schedules that re-arm after running.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron(_))
    }
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for its fire time.
    Pending,
    /// Claimed by a worker under a live lease.
    Running,
    /// Terminal: finished.
    Succeeded,
    /// Terminal: attempts exhausted or permanent error.
    Failed,
    /// Terminal: withdrawn.
    Cancelled,
}

impl TaskState {
    /// True for states the engine never leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// How a handler failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Retry with backoff.
    Transient,
    /// No retry; dead-letter immediately.
    Permanent,
}

/// A handler's failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExecutionError {
    pub class: ErrorClass,
    pub message: String,
}

impl TaskExecutionError {
    /// A retryable failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    /// A failure that retrying cannot fix.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }
}

/// A scheduled or delayed task.
///
/// The payload is an opaque byte blob; each registered handler deserializes
/// its own. `subject_id` scopes the serialization guarantee: two tasks with
/// the same `(task_type, subject_id)` never run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: ScheduledTaskId,
    pub task_type: String,
    pub subject_id: String,
    pub payload: Vec<u8>,
    pub schedule: Schedule,
    pub state: TaskState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_fire_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// True once the attempt budget is spent.
    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_schedule_fires_in_future() {
        let schedule = Schedule::Cron("0 */10 * * * *".to_string());
        let now = Utc::now();
        let fire = schedule.first_fire(now).unwrap();
        assert!(fire > now);
        assert!(schedule.is_recurring());
    }

    #[test]
    fn test_bad_cron_yields_none() {
        let schedule = Schedule::Cron("not a cron".to_string());
        assert_eq!(schedule.first_fire(Utc::now()), None);
    }

    #[test]
    fn test_after_schedule() {
        let now = Utc::now();
        let schedule = Schedule::After(90);
        assert_eq!(schedule.first_fire(now), Some(now + Duration::seconds(90)));
        // One-shot: nothing after execution.
        assert_eq!(schedule.next_fire(now), None);
    }

    #[test]
    fn test_at_schedule() {
        let at = Utc::now() + Duration::hours(2);
        let schedule = Schedule::At(at);
        assert_eq!(schedule.first_fire(Utc::now()), Some(at));
        assert!(!schedule.is_recurring());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }
}
