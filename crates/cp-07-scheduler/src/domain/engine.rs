//! The scheduler engine: enqueue, due-sweep, retries, recovery.

use super::backoff;
use super::breaker::TypeCircuitBreaker;
use super::entities::{ErrorClass, Schedule, ScheduledTask, TaskState};
use super::errors::SchedulerError;
use super::handler::HandlerRegistry;
use crate::ports::outbound::{DeadLetterStore, LeaseStore, ScheduledTaskStore};
use crate::{DEFAULT_MAX_ATTEMPTS, LEASE_SECS};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_bus::{EventPublisher, PlatformEvent};
use shared_types::ScheduledTaskId;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker lease TTL in seconds.
    pub lease_secs: u64,
    /// Attempt budget applied when the enqueuer does not set one.
    pub default_max_attempts: u32,
    /// Worker poll interval in seconds.
    pub poll_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_secs: LEASE_SECS,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_secs: 1,
        }
    }
}

/// The delayed-task engine.
pub struct SchedulerEngine {
    tasks: Arc<dyn ScheduledTaskStore>,
    leases: Arc<dyn LeaseStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    registry: Arc<HandlerRegistry>,
    breaker: TypeCircuitBreaker,
    bus: Arc<dyn EventPublisher>,
    config: EngineConfig,
    /// Serialization locks per `(task_type, subject_id)`.
    subject_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl SchedulerEngine {
    pub fn new(
        tasks: Arc<dyn ScheduledTaskStore>,
        leases: Arc<dyn LeaseStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        registry: Arc<HandlerRegistry>,
        breaker: TypeCircuitBreaker,
        bus: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tasks,
            leases,
            dead_letters,
            registry,
            breaker,
            bus,
            config,
            subject_locks: DashMap::new(),
        }
    }

    /// Enqueue a task. `subject_id` scopes the serialization guarantee.
    pub async fn enqueue(
        &self,
        task_type: &str,
        subject_id: &str,
        payload: Vec<u8>,
        schedule: Schedule,
        max_attempts: Option<u32>,
    ) -> Result<ScheduledTask, SchedulerError> {
        let now = Utc::now();
        let next_fire_at = schedule
            .first_fire(now)
            .ok_or_else(|| SchedulerError::BadCron {
                expr: match &schedule {
                    Schedule::Cron(expr) => expr.clone(),
                    _ => String::new(),
                },
            })?;

        let task = ScheduledTask {
            id: ScheduledTaskId::generate(),
            task_type: task_type.to_string(),
            subject_id: subject_id.to_string(),
            payload,
            schedule,
            state: TaskState::Pending,
            attempts: 0,
            max_attempts: max_attempts.unwrap_or(self.config.default_max_attempts),
            next_fire_at,
            last_error: None,
            created_at: now,
        };
        self.tasks.insert(&task).await?;
        debug!(
            task = %task.id,
            task_type,
            subject = subject_id,
            fire_at = %task.next_fire_at,
            "Task enqueued"
        );
        Ok(task)
    }

    /// Enqueue a recurring job unless a live instance already exists.
    ///
    /// Called at startup for each registered cron job; a restart finds the
    /// previous instance and leaves it in place.
    pub async fn ensure_recurring(
        &self,
        task_type: &str,
        subject_id: &str,
        cron_expr: &str,
    ) -> Result<ScheduledTask, SchedulerError> {
        if let Some(existing) = self.tasks.find_active(task_type, subject_id).await? {
            return Ok(existing);
        }
        self.enqueue(
            task_type,
            subject_id,
            Vec::new(),
            Schedule::Cron(cron_expr.to_string()),
            None,
        )
        .await
    }

    /// Cancel a pending task.
    pub async fn cancel(&self, id: &ScheduledTaskId) -> Result<(), SchedulerError> {
        let Some(mut task) = self.tasks.get(id).await? else {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        };
        if task.state.is_terminal() {
            return Err(SchedulerError::AlreadyTerminal);
        }
        task.state = TaskState::Cancelled;
        self.tasks.put(&task).await?;
        Ok(())
    }

    /// Execute every task due at `now`. Returns how many ran.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let due = self.tasks.due_before(now).await?;
        let mut ran = 0;
        for task in due {
            if self.process(task, now).await? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Return running tasks with lapsed leases to pending.
    ///
    /// Called once at startup and periodically after: a worker that died
    /// mid-execution leaves its task `running` with no live lease.
    pub async fn recover_expired_leases(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, SchedulerError> {
        let running = self.tasks.list_running().await?;
        let mut recovered = 0;
        for mut task in running {
            if self.leases.is_held(&task.id).await? {
                continue;
            }
            warn!(task = %task.id, task_type = %task.task_type, "Recovering task with lapsed lease");
            task.state = TaskState::Pending;
            task.next_fire_at = now;
            self.tasks.put(&task).await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Spawn `count` polling workers. Workers stop when `shutdown` flips to
    /// `true`.
    pub fn spawn_workers(
        self: &Arc<Self>,
        count: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        (0..count)
            .map(|worker| {
                let engine = Arc::clone(self);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(worker, "Scheduler worker started");
                    let interval = std::time::Duration::from_secs(engine.config.poll_interval_secs);
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {
                                if let Err(e) = engine.run_due(Utc::now()).await {
                                    error!(worker, error = %e, "Due sweep failed");
                                }
                            }
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    info!(worker, "Scheduler worker stopping");
                                    return;
                                }
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Process one due task. Returns `false` when the task was skipped
    /// (lease held elsewhere, breaker open, no longer due).
    async fn process(&self, task: ScheduledTask, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let key = (task.task_type.clone(), task.subject_id.clone());
        let lock = self
            .subject_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-read under the lock; a parallel worker may have finished it.
        let Some(mut task) = self.tasks.get(&task.id).await? else {
            return Ok(false);
        };
        if task.state != TaskState::Pending || task.next_fire_at > now {
            return Ok(false);
        }

        if !self.breaker.should_allow(&task.task_type, now) {
            task.next_fire_at = now + self.breaker.cool_down();
            task.last_error = Some("circuit open".to_string());
            self.tasks.put(&task).await?;
            debug!(task = %task.id, task_type = %task.task_type, "Breaker open, re-enqueued");
            return Ok(false);
        }

        if !self.leases.try_acquire(&task.id, self.config.lease_secs).await? {
            return Ok(false);
        }

        task.state = TaskState::Running;
        task.attempts += 1;
        self.tasks.put(&task).await?;

        let outcome = match self.registry.get(&task.task_type) {
            Some(handler) => handler.execute(&task).await,
            None => Err(super::entities::TaskExecutionError::permanent(format!(
                "no handler registered for {}",
                task.task_type
            ))),
        };

        match outcome {
            Ok(()) => {
                self.breaker.record_success(&task.task_type, now);
                task.last_error = None;
                if let Some(next) = task.schedule.next_fire(now) {
                    task.state = TaskState::Pending;
                    task.attempts = 0;
                    task.next_fire_at = next;
                } else {
                    task.state = TaskState::Succeeded;
                }
                self.tasks.put(&task).await?;
                debug!(task = %task.id, task_type = %task.task_type, "Task succeeded");
            }
            Err(failure) => {
                self.breaker.record_failure(&task.task_type, now);

                // Identical error signature twice running marks the task
                // poison, regardless of classification.
                let poison = task.last_error.as_deref() == Some(failure.message.as_str());
                let exhausted = task.attempts_exhausted();
                task.last_error = Some(failure.message.clone());

                if poison || failure.class == ErrorClass::Permanent || exhausted {
                    self.dead_letter(&mut task, now, poison).await?;
                } else {
                    let mut rng = StdRng::from_entropy();
                    let delay = backoff::retry_delay_secs(task.attempts, &mut rng);
                    task.state = TaskState::Pending;
                    task.next_fire_at = now + Duration::seconds(delay as i64);
                    self.tasks.put(&task).await?;
                    debug!(
                        task = %task.id,
                        attempt = task.attempts,
                        retry_in_secs = delay,
                        "Task failed, retry scheduled"
                    );
                }
            }
        }

        self.leases.release(&task.id).await?;
        Ok(true)
    }

    async fn dead_letter(
        &self,
        task: &mut ScheduledTask,
        now: DateTime<Utc>,
        poison: bool,
    ) -> Result<(), SchedulerError> {
        let error = task.last_error.clone().unwrap_or_default();
        warn!(
            task = %task.id,
            task_type = %task.task_type,
            attempts = task.attempts,
            poison,
            error = %error,
            "Task dead-lettered"
        );
        self.dead_letters.push(task).await?;
        self.bus
            .publish(
                PlatformEvent::TaskDeadLettered {
                    scheduled_task_id: task.id.clone(),
                    task_type: task.task_type.clone(),
                    error,
                },
                None,
            )
            .await;

        // A recurring job dead-letters the failed firing but keeps its
        // place in the calendar.
        if let Some(next) = task.schedule.next_fire(now) {
            task.state = TaskState::Pending;
            task.attempts = 0;
            task.next_fire_at = next;
        } else {
            task.state = TaskState::Failed;
        }
        self.tasks.put(task).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
