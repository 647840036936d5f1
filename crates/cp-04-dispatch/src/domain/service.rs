//! The dispatch service: task creation, acceptance, scans, timeouts.

use super::entities::{
    CourierTask, NextAction, ScanActor, ScanKind, ScanRequest, TaskPriority, TaskStatus,
};
use super::errors::DispatchError;
use super::eta::RollingEta;
use super::ranking::{self, RankedCandidate};
use crate::ports::outbound::{BarcodeControl, CourierDirectory, TaskStore};
use crate::{MAX_TASK_ATTEMPTS, REASSIGN_AFTER_HOURS, REMINDER_AFTER_HOURS};
use chrono::{DateTime, Duration, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use shared_bus::{EventPublisher, PlatformEvent};
use shared_types::{BarcodeCode, RequestId, TaskId};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one timeout sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutSweep {
    pub reminded: usize,
    pub reassigned: usize,
    pub failed: usize,
}

/// The task/scan engine.
pub struct DispatchService {
    tasks: Arc<dyn TaskStore>,
    couriers: Arc<dyn CourierDirectory>,
    barcodes: Arc<dyn BarcodeControl>,
    bus: Arc<dyn EventPublisher>,
    eta: RollingEta,
}

impl DispatchService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        couriers: Arc<dyn CourierDirectory>,
        barcodes: Arc<dyn BarcodeControl>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            tasks,
            couriers,
            barcodes,
            bus,
            eta: RollingEta::new(),
        }
    }

    /// Create and announce a task for a freshly bound barcode.
    ///
    /// The announce prefix follows the lowest courier level that covers the
    /// delivery code (L1 exact match first); with no candidates yet, the
    /// task is announced at area scope so future couriers see it.
    pub async fn create_task(
        &self,
        barcode_code: BarcodeCode,
        pickup: OpCode,
        delivery: OpCode,
        priority: TaskPriority,
        request_id: Option<RequestId>,
    ) -> Result<CourierTask, DispatchError> {
        let candidates = self.couriers.candidates_covering(&delivery).await?;
        let announce_prefix = match ranking::preferred_level(&candidates) {
            Some(rank) => announce_prefix_for_level(&delivery, rank),
            None => {
                warn!(delivery = %delivery, "No covering courier; announcing at area scope");
                delivery
                    .prefix_of(4)
                    .unwrap_or_else(|_| OpCodePrefix::from(delivery))
            }
        };

        let task = CourierTask::announced(
            TaskId::generate(),
            barcode_code,
            pickup,
            delivery,
            priority,
            Utc::now(),
        );
        self.tasks.insert(&task).await?;

        info!(
            task = %task.id,
            barcode = %task.barcode_code,
            pickup = %pickup,
            delivery = %delivery,
            room = %announce_prefix,
            "Task announced"
        );

        self.bus
            .publish(
                PlatformEvent::TaskPublished {
                    task_id: task.id.clone(),
                    barcode_code: task.barcode_code.clone(),
                    pickup_op_code: pickup,
                    delivery_op_code: delivery,
                    announce_prefix,
                },
                request_id,
            )
            .await;

        Ok(task)
    }

    /// Claim an available task. First caller wins; losers get
    /// [`DispatchError::AlreadyTaken`].
    pub async fn accept(
        &self,
        task_id: &TaskId,
        actor: &ScanActor,
        request_id: Option<RequestId>,
    ) -> Result<CourierTask, DispatchError> {
        let task = self.fetch(task_id).await?;
        if task.status.is_terminal() {
            return Err(DispatchError::AlreadyTerminal {
                status: task.status,
            });
        }

        let now = Utc::now();
        if !self.tasks.try_accept(task_id, &actor.courier_id, now).await? {
            return Err(DispatchError::AlreadyTaken);
        }

        self.couriers
            .record_assignment(&actor.courier_id, now)
            .await?;
        self.bus
            .publish(
                PlatformEvent::TaskAccepted {
                    task_id: task_id.clone(),
                    courier_id: actor.courier_id.clone(),
                },
                request_id,
            )
            .await;

        self.fetch(task_id).await
    }

    /// Apply a scan to a task, advancing the task and its barcode together.
    pub async fn scan(
        &self,
        task_id: &TaskId,
        actor: &ScanActor,
        scan: ScanRequest,
        request_id: Option<RequestId>,
    ) -> Result<CourierTask, DispatchError> {
        let mut task = self.fetch(task_id).await?;
        if task.status.is_terminal() {
            return Err(DispatchError::AlreadyTerminal {
                status: task.status,
            });
        }

        // A scan outside the courier's own territory is refused before any
        // task-specific detail can leak.
        if !actor.managed_prefix.covers(&scan.at_op_code) {
            return Err(DispatchError::OutsideScope {
                at: scan.at_op_code.to_string(),
                prefix: actor.managed_prefix.to_string(),
            });
        }

        self.check_assignee(&task, actor, scan.kind)?;
        self.check_stage_and_location(&task, &scan)?;

        // Barcode first: if its state machine refuses, the task is untouched.
        match scan.kind {
            ScanKind::Pickup => {
                self.barcodes
                    .mark_in_transit(
                        &task.barcode_code,
                        &actor.courier_id,
                        scan.at_op_code,
                        scan.timestamp,
                        actor.level_rank,
                    )
                    .await?;
            }
            ScanKind::Deliver => {
                self.barcodes
                    .mark_delivered(
                        &task.barcode_code,
                        &actor.courier_id,
                        scan.at_op_code,
                        scan.timestamp,
                        actor.level_rank,
                    )
                    .await?;
            }
            ScanKind::Fail => {
                self.barcodes
                    .mark_failed(
                        &task.barcode_code,
                        Some(&actor.courier_id),
                        Some(scan.at_op_code),
                        scan.timestamp,
                        actor.level_rank,
                    )
                    .await?;
            }
            ScanKind::Transit | ScanKind::Handoff => {}
        }

        let area = area_of(&task.delivery_op_code);
        match scan.kind {
            ScanKind::Pickup => {
                task.status = TaskStatus::Collected;
                task.current_op_code = scan.at_op_code;
                if let Some(accepted_at) = task.accepted_at {
                    self.eta
                        .record(&area, "pickup", (scan.timestamp - accepted_at).num_seconds());
                }
            }
            ScanKind::Transit => {
                task.status = TaskStatus::InTransit;
                task.current_op_code = scan.at_op_code;
            }
            ScanKind::Handoff => {
                task.current_op_code = scan.at_op_code;
            }
            ScanKind::Deliver => {
                task.status = TaskStatus::Delivered;
                task.current_op_code = scan.at_op_code;
                if let Some(accepted_at) = task.accepted_at {
                    self.eta
                        .record(&area, "deliver", (scan.timestamp - accepted_at).num_seconds());
                }
            }
            ScanKind::Fail => {
                task.status = TaskStatus::Failed;
            }
        }
        self.tasks.put(&task).await?;

        info!(
            task = %task.id,
            kind = scan.kind.as_str(),
            at = %scan.at_op_code,
            status = %task.status,
            "Scan applied"
        );

        if task.status.is_terminal() {
            let delivered = task.status == TaskStatus::Delivered;
            if let Some(courier_id) = &task.assigned_courier_id {
                self.couriers.record_outcome(courier_id, delivered).await?;
            }
            self.bus
                .publish(
                    PlatformEvent::TaskClosed {
                        task_id: task.id.clone(),
                        barcode_code: task.barcode_code.clone(),
                        final_status: task.status.as_str().to_string(),
                    },
                    request_id,
                )
                .await;
        }

        Ok(task)
    }

    /// What the holding courier should do next, with a rolling-average ETA.
    pub async fn next_action(&self, task_id: &TaskId) -> Result<NextAction, DispatchError> {
        let task = self.fetch(task_id).await?;
        let area = area_of(&task.delivery_op_code);
        let hint = match task.status {
            TaskStatus::Available => NextAction {
                action: "accept".to_string(),
                expected_op_code: task.pickup_op_code,
                eta_secs: None,
            },
            TaskStatus::Accepted => NextAction {
                action: ScanKind::Pickup.as_str().to_string(),
                expected_op_code: task.pickup_op_code,
                eta_secs: self.eta.estimate(&area, "pickup"),
            },
            TaskStatus::Collected => NextAction {
                action: ScanKind::Transit.as_str().to_string(),
                expected_op_code: task.current_op_code,
                eta_secs: self.eta.estimate(&area, "deliver"),
            },
            TaskStatus::InTransit => NextAction {
                action: ScanKind::Deliver.as_str().to_string(),
                expected_op_code: task.delivery_op_code,
                eta_secs: self.eta.estimate(&area, "deliver"),
            },
            TaskStatus::Delivered | TaskStatus::Failed => NextAction {
                action: "none".to_string(),
                expected_op_code: task.delivery_op_code,
                eta_secs: None,
            },
        };
        Ok(hint)
    }

    /// Tasks relevant to a courier: their own active ones plus unclaimed
    /// tasks announced under their area.
    pub async fn tasks_for_courier(
        &self,
        actor: &ScanActor,
    ) -> Result<Vec<CourierTask>, DispatchError> {
        let mut result = self.tasks.list_active_for(&actor.courier_id).await?;
        let area_len = actor.managed_prefix.len().min(4);
        let area = actor
            .managed_prefix
            .truncate(area_len)
            .unwrap_or(actor.managed_prefix);
        for task in self.tasks.list_available_under(&area).await? {
            if !result.iter().any(|t| t.id == task.id) {
                result.push(task);
            }
        }
        Ok(result)
    }

    /// Fetch one task.
    pub async fn get(&self, task_id: &TaskId) -> Result<CourierTask, DispatchError> {
        self.fetch(task_id).await
    }

    /// Ranked candidates for a delivery code, lowest covering level only.
    pub async fn ranked_candidates(
        &self,
        delivery: &OpCode,
    ) -> Result<Vec<RankedCandidate>, DispatchError> {
        let candidates = self.couriers.candidates_covering(delivery).await?;
        let Some(level) = ranking::preferred_level(&candidates) else {
            return Ok(Vec::new());
        };
        let mut joined = Vec::new();
        for candidate in candidates
            .into_iter()
            .filter(|c| c.level_rank == level)
        {
            let active_tasks = self.tasks.count_active_for(&candidate.courier_id).await?;
            joined.push(RankedCandidate {
                candidate,
                active_tasks,
            });
        }
        Ok(ranking::rank(joined))
    }

    /// Hourly timeout sweep: remind at 48 h, reassign at 96 h, fail after
    /// the attempt budget is spent.
    pub async fn check_timeouts(&self, now: DateTime<Utc>) -> Result<TimeoutSweep, DispatchError> {
        let cutoff = now - Duration::hours(REMINDER_AFTER_HOURS);
        let overdue = self.tasks.list_accepted_before(cutoff).await?;
        let mut sweep = TimeoutSweep::default();

        for mut task in overdue {
            let Some(accepted_at) = task.accepted_at else {
                continue;
            };
            let Some(courier_id) = task.assigned_courier_id.clone() else {
                continue;
            };
            let age = now - accepted_at;

            if age < Duration::hours(REASSIGN_AFTER_HOURS) {
                if task.reminded_at.is_none() {
                    task.reminded_at = Some(now);
                    self.tasks.put(&task).await?;
                    self.notify_courier(
                        &courier_id,
                        "Delivery reminder",
                        format!(
                            "Task {} has waited {} hours for its first scan.",
                            task.id,
                            age.num_hours()
                        ),
                    )
                    .await?;
                    sweep.reminded += 1;
                }
                continue;
            }

            task.attempts += 1;
            if task.attempts > MAX_TASK_ATTEMPTS {
                task.status = TaskStatus::Failed;
                self.tasks.put(&task).await?;
                self.barcodes
                    .mark_failed(&task.barcode_code, None, None, now, 4)
                    .await?;
                self.couriers.record_outcome(&courier_id, false).await?;
                self.bus
                    .publish(
                        PlatformEvent::TaskClosed {
                            task_id: task.id.clone(),
                            barcode_code: task.barcode_code.clone(),
                            final_status: TaskStatus::Failed.as_str().to_string(),
                        },
                        None,
                    )
                    .await;
                warn!(task = %task.id, attempts = task.attempts, "Task failed after repeated timeouts");
                sweep.failed += 1;
                continue;
            }

            task.status = TaskStatus::Available;
            task.assigned_courier_id = None;
            task.accepted_at = None;
            task.reminded_at = None;
            self.tasks.put(&task).await?;

            let candidates = self
                .couriers
                .candidates_covering(&task.delivery_op_code)
                .await?;
            let announce_prefix = match ranking::preferred_level(&candidates) {
                Some(rank) => announce_prefix_for_level(&task.delivery_op_code, rank),
                None => task
                    .delivery_op_code
                    .prefix_of(4)
                    .unwrap_or_else(|_| OpCodePrefix::from(task.delivery_op_code)),
            };

            self.bus
                .publish(
                    PlatformEvent::TaskReassigned {
                        task_id: task.id.clone(),
                        previous_courier_id: courier_id.clone(),
                        attempts: task.attempts,
                        announce_prefix,
                    },
                    None,
                )
                .await;
            self.notify_courier(
                &courier_id,
                "Task reassigned",
                format!("Task {} was returned to the pool after {} hours without a scan.", task.id, age.num_hours()),
            )
            .await?;
            info!(task = %task.id, attempts = task.attempts, "Task returned to available pool");
            sweep.reassigned += 1;
        }

        Ok(sweep)
    }

    fn check_assignee(
        &self,
        task: &CourierTask,
        actor: &ScanActor,
        kind: ScanKind,
    ) -> Result<(), DispatchError> {
        let is_assignee = task.assigned_courier_id.as_ref() == Some(&actor.courier_id);
        match kind {
            // Senior couriers may fail a task they do not hold.
            ScanKind::Fail if actor.level_rank >= 3 => Ok(()),
            _ if is_assignee => Ok(()),
            _ => Err(DispatchError::NotAssignee),
        }
    }

    fn check_stage_and_location(
        &self,
        task: &CourierTask,
        scan: &ScanRequest,
    ) -> Result<(), DispatchError> {
        let stage_ok = matches!(
            (scan.kind, task.status),
            (ScanKind::Pickup, TaskStatus::Accepted)
                | (ScanKind::Transit, TaskStatus::Collected)
                | (ScanKind::Handoff, TaskStatus::InTransit)
                | (ScanKind::Deliver, TaskStatus::InTransit)
                | (ScanKind::Fail, _)
        );
        if !stage_ok {
            return Err(DispatchError::WrongStage {
                kind: scan.kind,
                status: task.status,
            });
        }

        match scan.kind {
            ScanKind::Pickup => {
                if scan.at_op_code != task.pickup_op_code {
                    return Err(DispatchError::WrongLocation {
                        kind: scan.kind,
                        at: scan.at_op_code.to_string(),
                        expected: task.pickup_op_code.to_string(),
                    });
                }
            }
            ScanKind::Deliver => {
                if scan.at_op_code != task.delivery_op_code {
                    return Err(DispatchError::WrongLocation {
                        kind: scan.kind,
                        at: scan.at_op_code.to_string(),
                        expected: task.delivery_op_code.to_string(),
                    });
                }
            }
            ScanKind::Handoff => {
                if shared_prefix_len(&scan.at_op_code, &task.current_op_code)
                    < crate::HANDOFF_SHARED_PREFIX
                {
                    return Err(DispatchError::WrongLocation {
                        kind: scan.kind,
                        at: scan.at_op_code.to_string(),
                        expected: format!("within area of {}", task.current_op_code),
                    });
                }
            }
            // Transit and fail location rules are the managed-prefix check
            // already applied above.
            ScanKind::Transit | ScanKind::Fail => {}
        }
        Ok(())
    }

    async fn notify_courier(
        &self,
        courier_id: &shared_types::CourierId,
        title: &str,
        body: String,
    ) -> Result<(), DispatchError> {
        if let Some(user_id) = self.couriers.user_of(courier_id).await? {
            self.bus
                .publish(
                    PlatformEvent::NotificationRequested {
                        user_id,
                        title: title.to_string(),
                        body,
                    },
                    None,
                )
                .await;
        }
        Ok(())
    }

    async fn fetch(&self, id: &TaskId) -> Result<CourierTask, DispatchError> {
        match self.tasks.get(id).await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(DispatchError::NotFound { id: id.to_string() }),
            Err(e) => Err(DispatchError::Storage(e)),
        }
    }
}

/// The 4-character area key ETA statistics are bucketed by.
fn area_of(code: &OpCode) -> String {
    code.prefix_of(4)
        .map(|p| p.to_string())
        .unwrap_or_else(|_| code.to_string())
}

/// Announce-room prefix for a courier level covering `delivery`.
fn announce_prefix_for_level(delivery: &OpCode, level_rank: u8) -> OpCodePrefix {
    let len = match level_rank {
        1 => 6,
        2 | 3 => 4,
        _ => 2,
    };
    delivery
        .prefix_of(len)
        .unwrap_or_else(|_| OpCodePrefix::from(*delivery))
}

/// Length of the common even-length prefix of two codes.
fn shared_prefix_len(a: &OpCode, b: &OpCode) -> usize {
    let (a, b) = (a.as_str().as_bytes(), b.as_str().as_bytes());
    let mut len = 0;
    for chunk in (0..a.len().min(b.len())).step_by(2) {
        if a[chunk] == b[chunk] && a.get(chunk + 1) == b.get(chunk + 1) {
            len += 2;
        } else {
            break;
        }
    }
    len
}
