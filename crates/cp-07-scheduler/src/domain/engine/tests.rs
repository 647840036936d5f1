use super::*;
use crate::domain::breaker::{BreakerConfig, BreakerState};
use crate::domain::entities::TaskExecutionError;
use crate::domain::handler::TaskHandler;
use async_trait::async_trait;
use shared_types::StorageError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

#[derive(Default)]
struct MemSched {
    tasks: StdMutex<HashMap<ScheduledTaskId, ScheduledTask>>,
    leases: StdMutex<HashMap<ScheduledTaskId, DateTime<Utc>>>,
    dead: StdMutex<Vec<ScheduledTask>>,
}

#[async_trait]
impl ScheduledTaskStore for MemSched {
    async fn insert(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        let mut map = self.tasks.lock().unwrap();
        if map.contains_key(&task.id) {
            return Err(StorageError::Conflict(task.id.to_string()));
        }
        map.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &ScheduledTaskId) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn due_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTask>, StorageError> {
        let mut due: Vec<ScheduledTask> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.state == TaskState::Pending && t.next_fire_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_fire_at);
        Ok(due)
    }

    async fn list_running(&self) -> Result<Vec<ScheduledTask>, StorageError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.state == TaskState::Running)
            .cloned()
            .collect())
    }

    async fn find_active(
        &self,
        task_type: &str,
        subject_id: &str,
    ) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                !t.state.is_terminal() && t.task_type == task_type && t.subject_id == subject_id
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }
}

#[async_trait]
impl LeaseStore for MemSched {
    async fn try_acquire(
        &self,
        id: &ScheduledTaskId,
        ttl_secs: u64,
    ) -> Result<bool, StorageError> {
        let mut leases = self.leases.lock().unwrap();
        let now = Utc::now();
        if leases.get(id).is_some_and(|expiry| *expiry > now) {
            return Ok(false);
        }
        leases.insert(id.clone(), now + Duration::seconds(ttl_secs as i64));
        Ok(true)
    }

    async fn renew(&self, id: &ScheduledTaskId, ttl_secs: u64) -> Result<bool, StorageError> {
        self.try_acquire(id, ttl_secs).await
    }

    async fn release(&self, id: &ScheduledTaskId) -> Result<(), StorageError> {
        self.leases.lock().unwrap().remove(id);
        Ok(())
    }

    async fn is_held(&self, id: &ScheduledTaskId) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self
            .leases
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|expiry| *expiry > now))
    }
}

#[async_trait]
impl DeadLetterStore for MemSched {
    async fn push(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        self.dead.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn list(&self, task_type: &str) -> Result<Vec<ScheduledTask>, StorageError> {
        Ok(self
            .dead
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.task_type == task_type)
            .cloned()
            .collect())
    }
}

struct CountingHandler {
    executions: AtomicU32,
}

#[async_trait]
impl TaskHandler for CountingHandler {
    fn task_type(&self) -> &'static str {
        "counting"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails transiently until the nth attempt, then succeeds.
struct FlakyHandler {
    fail_times: u32,
    executions: AtomicU32,
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    fn task_type(&self) -> &'static str {
        "flaky"
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        let n = self.executions.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            // Vary the message so poison detection does not trip.
            Err(TaskExecutionError::transient(format!(
                "flaky failure {n} on attempt {}",
                task.attempts
            )))
        } else {
            Ok(())
        }
    }
}

struct PermanentHandler;

#[async_trait]
impl TaskHandler for PermanentHandler {
    fn task_type(&self) -> &'static str {
        "permanent"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        Err(TaskExecutionError::permanent("bad payload"))
    }
}

/// Always fails with the same signature: poison after two attempts.
struct PoisonHandler;

#[async_trait]
impl TaskHandler for PoisonHandler {
    fn task_type(&self) -> &'static str {
        "poison"
    }

    async fn execute(&self, _task: &ScheduledTask) -> Result<(), TaskExecutionError> {
        Err(TaskExecutionError::transient("identical signature"))
    }
}

fn engine_with(handlers: Vec<Arc<dyn TaskHandler>>) -> (Arc<MemSched>, SchedulerEngine) {
    let stores = Arc::new(MemSched::default());
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }
    let engine = SchedulerEngine::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        Arc::new(registry),
        TypeCircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::minutes(1),
            cool_down: Duration::seconds(30),
        }),
        Arc::new(shared_bus::InMemoryEventBus::new()),
        EngineConfig::default(),
    );
    (stores, engine)
}

/// Run due sweeps, hopping the clock past any backoff, until nothing is due.
async fn drain(engine: &SchedulerEngine, mut now: DateTime<Utc>, rounds: u32) -> DateTime<Utc> {
    for _ in 0..rounds {
        engine.run_due(now).await.unwrap();
        now += Duration::seconds(crate::BACKOFF_CAP_SECS as i64);
    }
    now
}

#[tokio::test]
async fn test_one_shot_task_runs_once() {
    let counting = Arc::new(CountingHandler {
        executions: AtomicU32::new(0),
    });
    let (_stores, engine) = engine_with(vec![counting.clone()]);

    let task = engine
        .enqueue("counting", "s1", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();

    let ran = engine.run_due(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(ran, 1);
    assert_eq!(counting.executions.load(Ordering::SeqCst), 1);

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Succeeded);

    // A second sweep finds nothing.
    let ran = engine.run_due(Utc::now() + Duration::seconds(2)).await.unwrap();
    assert_eq!(ran, 0);
}

#[tokio::test]
async fn test_future_task_not_due_yet() {
    let counting = Arc::new(CountingHandler {
        executions: AtomicU32::new(0),
    });
    let (_stores, engine) = engine_with(vec![counting.clone()]);
    engine
        .enqueue("counting", "s1", Vec::new(), Schedule::After(3600), None)
        .await
        .unwrap();

    assert_eq!(engine.run_due(Utc::now()).await.unwrap(), 0);
    assert_eq!(counting.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_failure_retries_with_backoff() {
    let flaky = Arc::new(FlakyHandler {
        fail_times: 2,
        executions: AtomicU32::new(0),
    });
    let (_stores, engine) = engine_with(vec![flaky.clone()]);
    let task = engine
        .enqueue("flaky", "s1", Vec::new(), Schedule::After(0), Some(5))
        .await
        .unwrap();

    let now = Utc::now() + Duration::seconds(1);
    engine.run_due(now).await.unwrap();

    // First attempt failed; a retry is scheduled in the future.
    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Pending);
    assert_eq!(stored.attempts, 1);
    assert!(stored.next_fire_at > now);
    assert!(stored.last_error.is_some());

    drain(&engine, now, 4).await;
    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Succeeded);
    assert_eq!(flaky.executions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_permanent_failure_dead_letters_immediately() {
    let (stores, engine) = engine_with(vec![Arc::new(PermanentHandler)]);
    let task = engine
        .enqueue("permanent", "s1", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();

    engine.run_due(Utc::now() + Duration::seconds(1)).await.unwrap();

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Failed);
    assert_eq!(stored.attempts, 1);
    assert_eq!(stores.dead.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_poison_detected_by_identical_signature() {
    let (stores, engine) = engine_with(vec![Arc::new(PoisonHandler)]);
    let task = engine
        .enqueue("poison", "s1", Vec::new(), Schedule::After(0), Some(10))
        .await
        .unwrap();

    let now = Utc::now() + Duration::seconds(1);
    engine.run_due(now).await.unwrap();
    // Second execution sees the same error signature and dead-letters well
    // before the attempt budget.
    drain(&engine, now, 2).await;

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Failed);
    assert!(stored.attempts <= 3);
    assert_eq!(stores.dead.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_attempt_budget_exhaustion_dead_letters() {
    let flaky = Arc::new(FlakyHandler {
        fail_times: u32::MAX,
        executions: AtomicU32::new(0),
    });
    let (stores, engine) = engine_with(vec![flaky]);
    let task = engine
        .enqueue("flaky", "s1", Vec::new(), Schedule::After(0), Some(3))
        .await
        .unwrap();

    drain(&engine, Utc::now() + Duration::seconds(1), 5).await;

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Failed);
    assert_eq!(stored.attempts, 3);
    assert_eq!(stores.dead.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_held_lease_blocks_execution() {
    let counting = Arc::new(CountingHandler {
        executions: AtomicU32::new(0),
    });
    let (stores, engine) = engine_with(vec![counting.clone()]);
    let task = engine
        .enqueue("counting", "s1", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();

    // Another worker holds the lease.
    stores.try_acquire(&task.id, 60).await.unwrap();

    let ran = engine.run_due(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(ran, 0);
    assert_eq!(counting.executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recover_expired_leases() {
    let counting = Arc::new(CountingHandler {
        executions: AtomicU32::new(0),
    });
    let (stores, engine) = engine_with(vec![counting.clone()]);
    let task = engine
        .enqueue("counting", "s1", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();

    // Simulate a worker that died mid-execution: running, lease lapsed.
    {
        let mut map = stores.tasks.lock().unwrap();
        let t = map.get_mut(&task.id).unwrap();
        t.state = TaskState::Running;
    }

    let recovered = engine.recover_expired_leases(Utc::now()).await.unwrap();
    assert_eq!(recovered, 1);

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Pending);

    // And it runs on the next sweep.
    engine.run_due(Utc::now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(counting.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cron_task_re_arms_after_success() {
    let counting = Arc::new(CountingHandler {
        executions: AtomicU32::new(0),
    });
    let (_stores, engine) = engine_with(vec![counting.clone()]);
    let task = engine
        .enqueue(
            "counting",
            "recurring",
            Vec::new(),
            Schedule::Cron("* * * * * *".to_string()),
            None,
        )
        .await
        .unwrap();

    engine.run_due(Utc::now() + Duration::seconds(2)).await.unwrap();
    assert_eq!(counting.executions.load(Ordering::SeqCst), 1);

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    // Still pending, re-armed for the next tick, attempts reset.
    assert_eq!(stored.state, TaskState::Pending);
    assert_eq!(stored.attempts, 0);
}

#[tokio::test]
async fn test_missing_handler_dead_letters() {
    let (stores, engine) = engine_with(vec![]);
    let task = engine
        .enqueue("unknown", "s1", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();

    engine.run_due(Utc::now() + Duration::seconds(1)).await.unwrap();
    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Failed);
    assert_eq!(stores.dead.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_breaker_open_fails_fast_and_re_enqueues() {
    let (_stores, engine) = engine_with(vec![Arc::new(PermanentHandler)]);

    // Three distinct permanent tasks trip the breaker (threshold 3).
    for i in 0..3 {
        engine
            .enqueue("permanent", &format!("s{i}"), Vec::new(), Schedule::After(0), None)
            .await
            .unwrap();
    }
    let now = Utc::now() + Duration::seconds(1);
    engine.run_due(now).await.unwrap();
    assert_eq!(engine.breaker.state("permanent"), BreakerState::Open);

    // A new task of that type is pushed out by the cool-down, not executed.
    let task = engine
        .enqueue("permanent", "s9", Vec::new(), Schedule::After(0), None)
        .await
        .unwrap();
    let ran = engine.run_due(now + Duration::seconds(1)).await.unwrap();
    assert_eq!(ran, 0);

    let stored = engine.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.state, TaskState::Pending);
    assert!(stored.next_fire_at > now);
    assert_eq!(stored.last_error.as_deref(), Some("circuit open"));
}
