//! The platform's recurring jobs.
//!
//! Each is a [`TaskHandler`] registered at startup and driven by the
//! scheduler's cron recurrence:
//!
//! | job | cadence | effect |
//! |---|---|---|
//! | `future_letter_unlock` | every 10 min | release barcodes whose reveal time passed |
//! | `courier_timeout_check` | hourly | remind at 48 h, requeue at 96 h |
//! | `unbound_letter_cleanup` | daily | expire drafts older than 7 days |
//! | `scheduled_ai_reply` | hourly | produce queued AI replies |

use async_trait::async_trait;
use chrono::Utc;
use cp_02_barcode::BarcodeService;
use cp_04_dispatch::DispatchService;
use cp_07_scheduler::{AiProducer, ScheduledTask, TaskExecutionError, TaskHandler};
use serde::{Deserialize, Serialize};
use shared_bus::{EventPublisher, PlatformEvent};
use shared_types::UserId;
use std::sync::Arc;
use tracing::info;

/// Cron expressions for the standing jobs (seconds-resolution fields).
pub mod cadence {
    pub const FUTURE_LETTER_UNLOCK: &str = "0 */10 * * * *";
    pub const COURIER_TIMEOUT_CHECK: &str = "0 0 * * * *";
    pub const UNBOUND_LETTER_CLEANUP: &str = "0 0 4 * * *";
    pub const SCHEDULED_AI_REPLY: &str = "0 30 * * * *";
}

/// Releases future letters whose reveal time has passed.
pub struct FutureLetterUnlock {
    barcodes: Arc<BarcodeService>,
}

impl FutureLetterUnlock {
    pub fn new(barcodes: Arc<BarcodeService>) -> Self {
        Self { barcodes }
    }
}

#[async_trait]
impl TaskHandler for FutureLetterUnlock {
    fn task_type(&self) -> &'static str {
        "future_letter_unlock"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        let released = self
            .barcodes
            .release_due_reveals(Utc::now())
            .await
            .map_err(|e| TaskExecutionError::transient(e.to_string()))?;
        if released > 0 {
            info!(released, "future_letter_unlock released letters");
        }
        Ok(())
    }
}

/// Reminds, requeues and fails overdue accepted tasks.
pub struct CourierTimeoutCheck {
    dispatch: Arc<DispatchService>,
}

impl CourierTimeoutCheck {
    pub fn new(dispatch: Arc<DispatchService>) -> Self {
        Self { dispatch }
    }
}

#[async_trait]
impl TaskHandler for CourierTimeoutCheck {
    fn task_type(&self) -> &'static str {
        "courier_timeout_check"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        let sweep = self
            .dispatch
            .check_timeouts(Utc::now())
            .await
            .map_err(|e| TaskExecutionError::transient(e.to_string()))?;
        if sweep.reminded + sweep.reassigned + sweep.failed > 0 {
            info!(
                reminded = sweep.reminded,
                reassigned = sweep.reassigned,
                failed = sweep.failed,
                "courier_timeout_check swept overdue tasks"
            );
        }
        Ok(())
    }
}

/// Expires draft letters that never got bound.
pub struct UnboundLetterCleanup {
    barcodes: Arc<BarcodeService>,
}

impl UnboundLetterCleanup {
    pub fn new(barcodes: Arc<BarcodeService>) -> Self {
        Self { barcodes }
    }
}

#[async_trait]
impl TaskHandler for UnboundLetterCleanup {
    fn task_type(&self) -> &'static str {
        "unbound_letter_cleanup"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        self.barcodes
            .cleanup_stale_drafts(Utc::now())
            .await
            .map_err(|e| TaskExecutionError::transient(e.to_string()))?;
        Ok(())
    }
}

/// Payload of one queued AI reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiReplyPayload {
    pub user_id: UserId,
    pub prompt: String,
    pub persona: String,
    pub context: String,
}

/// Produces a queued AI reply and notifies the recipient.
///
/// Producer failures are transient by policy; the engine's retry and
/// circuit breaker absorb provider outages.
pub struct ScheduledAiReply {
    producer: Arc<dyn AiProducer>,
    bus: Arc<dyn EventPublisher>,
}

impl ScheduledAiReply {
    pub fn new(producer: Arc<dyn AiProducer>, bus: Arc<dyn EventPublisher>) -> Self {
        Self { producer, bus }
    }
}

#[async_trait]
impl TaskHandler for ScheduledAiReply {
    fn task_type(&self) -> &'static str {
        "scheduled_ai_reply"
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        // The standing cron instance carries no payload and is a no-op
        // heartbeat; replies queued by the composition flow carry one.
        if task.payload.is_empty() {
            return Ok(());
        }
        let payload: AiReplyPayload = bincode::deserialize(&task.payload)
            .map_err(|e| TaskExecutionError::permanent(format!("bad payload: {e}")))?;

        let reply = self
            .producer
            .generate(&payload.prompt, &payload.persona, &payload.context)
            .await
            .map_err(TaskExecutionError::transient)?;

        self.bus
            .publish(
                PlatformEvent::NotificationRequested {
                    user_id: payload.user_id,
                    title: "A reply arrived".to_string(),
                    body: reply.text,
                },
                None,
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::TemplateAiProducer;
    use chrono::Utc;
    use cp_07_scheduler::{Schedule, TaskState};
    use shared_types::ScheduledTaskId;

    fn task_with_payload(payload: Vec<u8>) -> ScheduledTask {
        ScheduledTask {
            id: ScheduledTaskId::generate(),
            task_type: "scheduled_ai_reply".into(),
            subject_id: "U1".into(),
            payload,
            schedule: Schedule::After(0),
            state: TaskState::Pending,
            attempts: 0,
            max_attempts: 3,
            next_fire_at: Utc::now(),
            last_error: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ai_reply_publishes_notification() {
        let bus = Arc::new(shared_bus::InMemoryEventBus::new());
        let handler = ScheduledAiReply::new(Arc::new(TemplateAiProducer), bus.clone());

        let payload = AiReplyPayload {
            user_id: UserId::from("U1"),
            prompt: "hello".into(),
            persona: "penpal".into(),
            context: String::new(),
        };
        let task = task_with_payload(bincode::serialize(&payload).unwrap());

        let mut sub = bus.subscribe(shared_bus::EventFilter::all());
        handler.execute(&task).await.unwrap();

        let published = sub.try_recv().unwrap().unwrap();
        assert!(matches!(
            published.event,
            PlatformEvent::NotificationRequested { .. }
        ));
    }

    #[tokio::test]
    async fn test_ai_reply_garbage_payload_is_permanent() {
        let bus = Arc::new(shared_bus::InMemoryEventBus::new());
        let handler = ScheduledAiReply::new(Arc::new(TemplateAiProducer), bus);
        let task = task_with_payload(vec![0xFF, 0x01]);

        let err = handler.execute(&task).await.unwrap_err();
        assert_eq!(err.class, cp_07_scheduler::ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_ai_reply_empty_payload_is_noop() {
        let bus = Arc::new(shared_bus::InMemoryEventBus::new());
        let handler = ScheduledAiReply::new(Arc::new(TemplateAiProducer), bus);
        handler.execute(&task_with_payload(Vec::new())).await.unwrap();
    }
}
