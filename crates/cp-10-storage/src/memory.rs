//! In-memory adapter over concurrent maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use cp_02_barcode::domain::entities::Barcode;
use cp_02_barcode::ports::outbound::{BarcodeStore, EnvelopeStore, LetterStore};
use cp_03_courier::domain::entities::Courier;
use cp_03_courier::ports::outbound::CourierStore;
use cp_04_dispatch::domain::entities::{CourierTask, TaskStatus};
use cp_04_dispatch::ports::outbound::TaskStore;
use cp_07_scheduler::domain::entities::{ScheduledTask, TaskState};
use cp_07_scheduler::ports::outbound::{DeadLetterStore, LeaseStore, ScheduledTaskStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_types::{
    BarcodeCode, CourierId, Envelope, EnvelopeId, Letter, LetterId, LetterStatus,
    ScheduledTaskId, StorageError, TaskId, UserId,
};

/// Everything in maps. One instance backs all ports in the dev profile and
/// in tests.
#[derive(Default)]
pub struct MemoryStore {
    barcodes: DashMap<BarcodeCode, Barcode>,
    letters: DashMap<LetterId, Letter>,
    envelopes: DashMap<EnvelopeId, Envelope>,
    couriers: DashMap<CourierId, Courier>,
    tasks: DashMap<TaskId, CourierTask>,
    scheduled: DashMap<ScheduledTaskId, ScheduledTask>,
    leases: DashMap<ScheduledTaskId, DateTime<Utc>>,
    dead_letters: Mutex<Vec<ScheduledTask>>,
    /// Serializes task acceptance: the compare-and-swap must observe and
    /// update status atomically.
    accept_gate: Mutex<()>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Barcode subsystem ports
// ---------------------------------------------------------------------------

#[async_trait]
impl BarcodeStore for MemoryStore {
    async fn reserve(&self, barcode: Barcode) -> Result<bool, StorageError> {
        match self.barcodes.entry(barcode.code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(barcode);
                Ok(true)
            }
        }
    }

    async fn get(&self, code: &BarcodeCode) -> Result<Option<Barcode>, StorageError> {
        Ok(self.barcodes.get(code).map(|b| b.clone()))
    }

    async fn put(&self, barcode: &Barcode) -> Result<(), StorageError> {
        if !self.barcodes.contains_key(&barcode.code) {
            return Err(StorageError::NotFound(barcode.code.to_string()));
        }
        self.barcodes.insert(barcode.code.clone(), barcode.clone());
        Ok(())
    }

    async fn list_reveal_due(&self, now: DateTime<Utc>) -> Result<Vec<Barcode>, StorageError> {
        Ok(self
            .barcodes
            .iter()
            .filter(|b| b.reveal_at.is_some_and(|at| at <= now))
            .map(|b| b.clone())
            .collect())
    }
}

#[async_trait]
impl LetterStore for MemoryStore {
    async fn get(&self, id: &LetterId) -> Result<Option<Letter>, StorageError> {
        Ok(self.letters.get(id).map(|l| l.clone()))
    }

    async fn put(&self, letter: &Letter) -> Result<(), StorageError> {
        self.letters.insert(letter.id.clone(), letter.clone());
        Ok(())
    }

    async fn list_drafts_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Letter>, StorageError> {
        Ok(self
            .letters
            .iter()
            .filter(|l| l.status == LetterStatus::Draft && l.created_at < cutoff)
            .map(|l| l.clone())
            .collect())
    }
}

#[async_trait]
impl EnvelopeStore for MemoryStore {
    async fn get(&self, id: &EnvelopeId) -> Result<Option<Envelope>, StorageError> {
        Ok(self.envelopes.get(id).map(|e| e.clone()))
    }

    async fn put(&self, envelope: &Envelope) -> Result<(), StorageError> {
        self.envelopes.insert(envelope.id.clone(), envelope.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Courier subsystem port
// ---------------------------------------------------------------------------

#[async_trait]
impl CourierStore for MemoryStore {
    async fn insert(&self, courier: &Courier) -> Result<(), StorageError> {
        match self.couriers.entry(courier.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::Conflict(courier.id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(courier.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &CourierId) -> Result<Option<Courier>, StorageError> {
        Ok(self.couriers.get(id).map(|c| c.clone()))
    }

    async fn get_by_user(&self, user_id: &UserId) -> Result<Option<Courier>, StorageError> {
        Ok(self
            .couriers
            .iter()
            .find(|c| &c.user_id == user_id)
            .map(|c| c.clone()))
    }

    async fn put(&self, courier: &Courier) -> Result<(), StorageError> {
        if !self.couriers.contains_key(&courier.id) {
            return Err(StorageError::NotFound(courier.id.to_string()));
        }
        self.couriers.insert(courier.id.clone(), courier.clone());
        Ok(())
    }

    async fn list_children(&self, parent_id: &CourierId) -> Result<Vec<Courier>, StorageError> {
        Ok(self
            .couriers
            .iter()
            .filter(|c| c.parent_courier_id.as_ref() == Some(parent_id))
            .map(|c| c.clone())
            .collect())
    }

    async fn list_covering(&self, code: &OpCode) -> Result<Vec<Courier>, StorageError> {
        Ok(self
            .couriers
            .iter()
            .filter(|c| c.managed_prefix.covers(code))
            .map(|c| c.clone())
            .collect())
    }

    async fn list_claiming(&self, prefix: &OpCodePrefix) -> Result<Vec<Courier>, StorageError> {
        Ok(self
            .couriers
            .iter()
            .filter(|c| &c.managed_prefix == prefix)
            .map(|c| c.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Dispatch subsystem port
// ---------------------------------------------------------------------------

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, task: &CourierTask) -> Result<(), StorageError> {
        match self.tasks.entry(task.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::Conflict(task.id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Option<CourierTask>, StorageError> {
        Ok(self.tasks.get(id).map(|t| t.clone()))
    }

    async fn put(&self, task: &CourierTask) -> Result<(), StorageError> {
        if !self.tasks.contains_key(&task.id) {
            return Err(StorageError::NotFound(task.id.to_string()));
        }
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn try_accept(
        &self,
        id: &TaskId,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let _gate = self.accept_gate.lock();
        let Some(mut task) = self.tasks.get_mut(id) else {
            return Err(StorageError::NotFound(id.to_string()));
        };
        if task.status != TaskStatus::Available {
            return Ok(false);
        }
        task.status = TaskStatus::Accepted;
        task.assigned_courier_id = Some(courier_id.clone());
        task.accepted_at = Some(at);
        Ok(true)
    }

    async fn list_available_under(
        &self,
        prefix: &OpCodePrefix,
    ) -> Result<Vec<CourierTask>, StorageError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Available && prefix.covers(&t.delivery_op_code))
            .map(|t| t.clone())
            .collect())
    }

    async fn list_accepted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CourierTask>, StorageError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                t.status == TaskStatus::Accepted && t.accepted_at.is_some_and(|at| at <= cutoff)
            })
            .map(|t| t.clone())
            .collect())
    }

    async fn list_active_for(
        &self,
        courier_id: &CourierId,
    ) -> Result<Vec<CourierTask>, StorageError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                !t.status.is_terminal() && t.assigned_courier_id.as_ref() == Some(courier_id)
            })
            .map(|t| t.clone())
            .collect())
    }

    async fn count_active_for(&self, courier_id: &CourierId) -> Result<usize, StorageError> {
        Ok(self.list_active_for(courier_id).await?.len())
    }
}

// ---------------------------------------------------------------------------
// Scheduler subsystem ports
// ---------------------------------------------------------------------------

#[async_trait]
impl ScheduledTaskStore for MemoryStore {
    async fn insert(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        match self.scheduled.entry(task.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StorageError::Conflict(task.id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &ScheduledTaskId) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self.scheduled.get(id).map(|t| t.clone()))
    }

    async fn put(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        if !self.scheduled.contains_key(&task.id) {
            return Err(StorageError::NotFound(task.id.to_string()));
        }
        self.scheduled.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn due_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTask>, StorageError> {
        let mut due: Vec<ScheduledTask> = self
            .scheduled
            .iter()
            .filter(|t| t.state == TaskState::Pending && t.next_fire_at <= now)
            .map(|t| t.clone())
            .collect();
        due.sort_by_key(|t| t.next_fire_at);
        Ok(due)
    }

    async fn list_running(&self) -> Result<Vec<ScheduledTask>, StorageError> {
        Ok(self
            .scheduled
            .iter()
            .filter(|t| t.state == TaskState::Running)
            .map(|t| t.clone())
            .collect())
    }

    async fn find_active(
        &self,
        task_type: &str,
        subject_id: &str,
    ) -> Result<Option<ScheduledTask>, StorageError> {
        Ok(self
            .scheduled
            .iter()
            .filter(|t| {
                !t.state.is_terminal() && t.task_type == task_type && t.subject_id == subject_id
            })
            .max_by_key(|t| t.created_at)
            .map(|t| t.clone()))
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn try_acquire(
        &self,
        id: &ScheduledTaskId,
        ttl_secs: u64,
    ) -> Result<bool, StorageError> {
        let now = Utc::now();
        let expiry = now + chrono::Duration::seconds(ttl_secs as i64);
        match self.leases.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    Ok(false)
                } else {
                    occupied.insert(expiry);
                    Ok(true)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(expiry);
                Ok(true)
            }
        }
    }

    async fn renew(&self, id: &ScheduledTaskId, ttl_secs: u64) -> Result<bool, StorageError> {
        let now = Utc::now();
        match self.leases.get_mut(id) {
            Some(mut expiry) if *expiry > now => {
                *expiry = now + chrono::Duration::seconds(ttl_secs as i64);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &ScheduledTaskId) -> Result<(), StorageError> {
        self.leases.remove(id);
        Ok(())
    }

    async fn is_held(&self, id: &ScheduledTaskId) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self.leases.get(id).is_some_and(|expiry| *expiry > now))
    }
}

#[async_trait]
impl DeadLetterStore for MemoryStore {
    async fn push(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        self.dead_letters.lock().push(task.clone());
        Ok(())
    }

    async fn list(&self, task_type: &str) -> Result<Vec<ScheduledTask>, StorageError> {
        let mut matching: Vec<ScheduledTask> = self
            .dead_letters
            .lock()
            .iter()
            .filter(|t| t.task_type == task_type)
            .cloned()
            .collect();
        matching.reverse();
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_02_barcode::domain::entities::BarcodeStatus;
    use cp_04_dispatch::domain::entities::TaskPriority;

    fn barcode(code: &str) -> Barcode {
        Barcode::issued(BarcodeCode::from(code), Utc::now())
    }

    fn task(id: &str, delivery: &str) -> CourierTask {
        CourierTask::announced(
            TaskId::from(id),
            BarcodeCode::from("AB12CD34"),
            OpCode::parse("PK5F3D").unwrap(),
            OpCode::parse(delivery).unwrap(),
            TaskPriority::Normal,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_barcode_reserve_is_first_writer_wins() {
        let store = MemoryStore::new();
        assert!(store.reserve(barcode("AB12CD34")).await.unwrap());
        assert!(!store.reserve(barcode("AB12CD34")).await.unwrap());
        assert!(store.reserve(barcode("ZZ99YY88")).await.unwrap());
    }

    #[tokio::test]
    async fn test_barcode_put_requires_reserve() {
        let store = MemoryStore::new();
        let mut b = barcode("AB12CD34");
        assert!(matches!(
            BarcodeStore::put(&store, &b).await,
            Err(StorageError::NotFound(_))
        ));
        store.reserve(b.clone()).await.unwrap();
        b.status = BarcodeStatus::Cancelled;
        BarcodeStore::put(&store, &b).await.unwrap();
        let stored = BarcodeStore::get(&store, &b.code).await.unwrap().unwrap();
        assert_eq!(stored.status, BarcodeStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_try_accept_cas_single_winner() {
        let store = MemoryStore::new();
        TaskStore::insert(&store, &task("T1", "PK5F2A")).await.unwrap();

        let now = Utc::now();
        let first = store
            .try_accept(&TaskId::from("T1"), &CourierId::from("C1"), now)
            .await
            .unwrap();
        let second = store
            .try_accept(&TaskId::from("T1"), &CourierId::from("C2"), now)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let stored = TaskStore::get(&store, &TaskId::from("T1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.assigned_courier_id, Some(CourierId::from("C1")));
    }

    #[tokio::test]
    async fn test_list_available_under_prefix() {
        let store = MemoryStore::new();
        TaskStore::insert(&store, &task("T1", "PK5F2A")).await.unwrap();
        TaskStore::insert(&store, &task("T2", "QH1A2B")).await.unwrap();

        let area = OpCodePrefix::parse("PK5F").unwrap();
        let visible = store.list_available_under(&area).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, TaskId::from("T1"));
    }

    #[tokio::test]
    async fn test_lease_lifecycle() {
        let store = MemoryStore::new();
        let id = ScheduledTaskId::from("S1");

        assert!(store.try_acquire(&id, 60).await.unwrap());
        assert!(!store.try_acquire(&id, 60).await.unwrap());
        assert!(store.is_held(&id).await.unwrap());
        assert!(store.renew(&id, 60).await.unwrap());

        store.release(&id).await.unwrap();
        assert!(!store.is_held(&id).await.unwrap());
        assert!(store.try_acquire(&id, 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_due_before_is_sorted() {
        use cp_07_scheduler::domain::entities::Schedule;
        let store = MemoryStore::new();
        let now = Utc::now();
        for (n, offset) in [(1, -30i64), (2, -10), (3, 60)] {
            let t = ScheduledTask {
                id: ScheduledTaskId::from(format!("S{n}").as_str()),
                task_type: "t".into(),
                subject_id: "s".into(),
                payload: Vec::new(),
                schedule: Schedule::After(0),
                state: TaskState::Pending,
                attempts: 0,
                max_attempts: 3,
                next_fire_at: now + chrono::Duration::seconds(offset),
                last_error: None,
                created_at: now,
            };
            ScheduledTaskStore::insert(&store, &t).await.unwrap();
        }

        let due = store.due_before(now).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
    }
}
