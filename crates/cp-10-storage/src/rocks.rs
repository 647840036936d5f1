//! RocksDB adapter.
//!
//! One database, one column family per aggregate, bincode values. A file
//! lock guards the data directory against a second process opening it.
//! Secondary lookups (prefix coverage, due sweeps) are straight column
//! scans; the data volumes here are campus-sized, not chain-sized.

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
use cp_08_idempotency::{IdempotencyKey, IdempotencyRecord, IdempotencyStore};
use fs2::FileExt;
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    BarcodeCode, CourierId, Envelope, EnvelopeId, Letter, LetterId, LetterStatus,
    ScheduledTaskId, StorageError, TaskId, UserId,
};
use std::fs::File;
use std::path::Path;
use tracing::info;

const CF_BARCODES: &str = "barcodes";
const CF_LETTERS: &str = "letters";
const CF_ENVELOPES: &str = "envelopes";
const CF_COURIERS: &str = "couriers";
const CF_TASKS: &str = "tasks";
const CF_SCHEDULED: &str = "scheduled";
const CF_LEASES: &str = "leases";
const CF_DEAD: &str = "dead_letters";
const CF_IDEMPOTENCY: &str = "idempotency";

const ALL_CFS: [&str; 9] = [
    CF_BARCODES,
    CF_LETTERS,
    CF_ENVELOPES,
    CF_COURIERS,
    CF_TASKS,
    CF_SCHEDULED,
    CF_LEASES,
    CF_DEAD,
    CF_IDEMPOTENCY,
];

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(e.to_string())
}

/// Production store over RocksDB.
pub struct RocksStore {
    db: DB,
    /// Held for the process lifetime; prevents a second opener.
    _dir_lock: File,
    /// Serializes read-modify-write sequences (task CAS, lease claims).
    write_gate: Mutex<()>,
}

impl RocksStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path).map_err(backend)?;

        let lock_path = path.join("campuspost.lock");
        let dir_lock = File::create(&lock_path).map_err(backend)?;
        dir_lock
            .try_lock_exclusive()
            .map_err(|_| StorageError::Conflict("data directory already locked".into()))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(backend)?;

        info!(path = %path.display(), "RocksDB store opened");
        Ok(Self {
            db,
            _dir_lock: dir_lock,
            write_gate: Mutex::new(()),
        })
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &str) -> Result<Option<T>, StorageError> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {cf}")))?;
        match self.db.get_cf(handle, key.as_bytes()).map_err(backend)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(corrupt)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &str, value: &T) -> Result<(), StorageError> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {cf}")))?;
        let bytes = bincode::serialize(value).map_err(corrupt)?;
        self.db.put_cf(handle, key.as_bytes(), bytes).map_err(backend)
    }

    fn delete(&self, cf: &str, key: &str) -> Result<(), StorageError> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {cf}")))?;
        self.db.delete_cf(handle, key.as_bytes()).map_err(backend)
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>, StorageError> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {cf}")))?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item.map_err(backend)?;
            out.push(bincode::deserialize(&value).map_err(corrupt)?);
        }
        Ok(out)
    }

    fn exists(&self, cf: &str, key: &str) -> Result<bool, StorageError> {
        let handle = self
            .db
            .cf_handle(cf)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {cf}")))?;
        Ok(self.db.get_cf(handle, key.as_bytes()).map_err(backend)?.is_some())
    }
}

// ---------------------------------------------------------------------------
// Barcode subsystem ports
// ---------------------------------------------------------------------------

#[async_trait]
impl BarcodeStore for RocksStore {
    async fn reserve(&self, barcode: Barcode) -> Result<bool, StorageError> {
        let _gate = self.write_gate.lock();
        if self.exists(CF_BARCODES, barcode.code.as_str())? {
            return Ok(false);
        }
        self.write(CF_BARCODES, barcode.code.as_str(), &barcode)?;
        Ok(true)
    }

    async fn get(&self, code: &BarcodeCode) -> Result<Option<Barcode>, StorageError> {
        self.read(CF_BARCODES, code.as_str())
    }

    async fn put(&self, barcode: &Barcode) -> Result<(), StorageError> {
        if !self.exists(CF_BARCODES, barcode.code.as_str())? {
            return Err(StorageError::NotFound(barcode.code.to_string()));
        }
        self.write(CF_BARCODES, barcode.code.as_str(), barcode)
    }

    async fn list_reveal_due(&self, now: DateTime<Utc>) -> Result<Vec<Barcode>, StorageError> {
        let all: Vec<Barcode> = self.scan(CF_BARCODES)?;
        Ok(all
            .into_iter()
            .filter(|b| b.reveal_at.is_some_and(|at| at <= now))
            .collect())
    }
}

#[async_trait]
impl LetterStore for RocksStore {
    async fn get(&self, id: &LetterId) -> Result<Option<Letter>, StorageError> {
        self.read(CF_LETTERS, id.as_str())
    }

    async fn put(&self, letter: &Letter) -> Result<(), StorageError> {
        self.write(CF_LETTERS, letter.id.as_str(), letter)
    }

    async fn list_drafts_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Letter>, StorageError> {
        let all: Vec<Letter> = self.scan(CF_LETTERS)?;
        Ok(all
            .into_iter()
            .filter(|l| l.status == LetterStatus::Draft && l.created_at < cutoff)
            .collect())
    }
}

#[async_trait]
impl EnvelopeStore for RocksStore {
    async fn get(&self, id: &EnvelopeId) -> Result<Option<Envelope>, StorageError> {
        self.read(CF_ENVELOPES, id.as_str())
    }

    async fn put(&self, envelope: &Envelope) -> Result<(), StorageError> {
        self.write(CF_ENVELOPES, envelope.id.as_str(), envelope)
    }
}

// ---------------------------------------------------------------------------
// Courier subsystem port
// ---------------------------------------------------------------------------

#[async_trait]
impl CourierStore for RocksStore {
    async fn insert(&self, courier: &Courier) -> Result<(), StorageError> {
        let _gate = self.write_gate.lock();
        if self.exists(CF_COURIERS, courier.id.as_str())? {
            return Err(StorageError::Conflict(courier.id.to_string()));
        }
        self.write(CF_COURIERS, courier.id.as_str(), courier)
    }

    async fn get(&self, id: &CourierId) -> Result<Option<Courier>, StorageError> {
        self.read(CF_COURIERS, id.as_str())
    }

    async fn get_by_user(&self, user_id: &UserId) -> Result<Option<Courier>, StorageError> {
        let all: Vec<Courier> = self.scan(CF_COURIERS)?;
        Ok(all.into_iter().find(|c| &c.user_id == user_id))
    }

    async fn put(&self, courier: &Courier) -> Result<(), StorageError> {
        if !self.exists(CF_COURIERS, courier.id.as_str())? {
            return Err(StorageError::NotFound(courier.id.to_string()));
        }
        self.write(CF_COURIERS, courier.id.as_str(), courier)
    }

    async fn list_children(&self, parent_id: &CourierId) -> Result<Vec<Courier>, StorageError> {
        let all: Vec<Courier> = self.scan(CF_COURIERS)?;
        Ok(all
            .into_iter()
            .filter(|c| c.parent_courier_id.as_ref() == Some(parent_id))
            .collect())
    }

    async fn list_covering(&self, code: &OpCode) -> Result<Vec<Courier>, StorageError> {
        let all: Vec<Courier> = self.scan(CF_COURIERS)?;
        Ok(all
            .into_iter()
            .filter(|c| c.managed_prefix.covers(code))
            .collect())
    }

    async fn list_claiming(&self, prefix: &OpCodePrefix) -> Result<Vec<Courier>, StorageError> {
        let all: Vec<Courier> = self.scan(CF_COURIERS)?;
        Ok(all
            .into_iter()
            .filter(|c| &c.managed_prefix == prefix)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Dispatch subsystem port
// ---------------------------------------------------------------------------

#[async_trait]
impl TaskStore for RocksStore {
    async fn insert(&self, task: &CourierTask) -> Result<(), StorageError> {
        let _gate = self.write_gate.lock();
        if self.exists(CF_TASKS, task.id.as_str())? {
            return Err(StorageError::Conflict(task.id.to_string()));
        }
        self.write(CF_TASKS, task.id.as_str(), task)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<CourierTask>, StorageError> {
        self.read(CF_TASKS, id.as_str())
    }

    async fn put(&self, task: &CourierTask) -> Result<(), StorageError> {
        if !self.exists(CF_TASKS, task.id.as_str())? {
            return Err(StorageError::NotFound(task.id.to_string()));
        }
        self.write(CF_TASKS, task.id.as_str(), task)
    }

    async fn try_accept(
        &self,
        id: &TaskId,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let _gate = self.write_gate.lock();
        let Some(mut task) = self.read::<CourierTask>(CF_TASKS, id.as_str())? else {
            return Err(StorageError::NotFound(id.to_string()));
        };
        if task.status != TaskStatus::Available {
            return Ok(false);
        }
        task.status = TaskStatus::Accepted;
        task.assigned_courier_id = Some(courier_id.clone());
        task.accepted_at = Some(at);
        self.write(CF_TASKS, id.as_str(), &task)?;
        Ok(true)
    }

    async fn list_available_under(
        &self,
        prefix: &OpCodePrefix,
    ) -> Result<Vec<CourierTask>, StorageError> {
        let all: Vec<CourierTask> = self.scan(CF_TASKS)?;
        Ok(all
            .into_iter()
            .filter(|t| t.status == TaskStatus::Available && prefix.covers(&t.delivery_op_code))
            .collect())
    }

    async fn list_accepted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CourierTask>, StorageError> {
        let all: Vec<CourierTask> = self.scan(CF_TASKS)?;
        Ok(all
            .into_iter()
            .filter(|t| {
                t.status == TaskStatus::Accepted && t.accepted_at.is_some_and(|at| at <= cutoff)
            })
            .collect())
    }

    async fn list_active_for(
        &self,
        courier_id: &CourierId,
    ) -> Result<Vec<CourierTask>, StorageError> {
        let all: Vec<CourierTask> = self.scan(CF_TASKS)?;
        Ok(all
            .into_iter()
            .filter(|t| {
                !t.status.is_terminal() && t.assigned_courier_id.as_ref() == Some(courier_id)
            })
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
impl ScheduledTaskStore for RocksStore {
    async fn insert(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        let _gate = self.write_gate.lock();
        if self.exists(CF_SCHEDULED, task.id.as_str())? {
            return Err(StorageError::Conflict(task.id.to_string()));
        }
        self.write(CF_SCHEDULED, task.id.as_str(), task)
    }

    async fn get(&self, id: &ScheduledTaskId) -> Result<Option<ScheduledTask>, StorageError> {
        self.read(CF_SCHEDULED, id.as_str())
    }

    async fn put(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        if !self.exists(CF_SCHEDULED, task.id.as_str())? {
            return Err(StorageError::NotFound(task.id.to_string()));
        }
        self.write(CF_SCHEDULED, task.id.as_str(), task)
    }

    async fn due_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTask>, StorageError> {
        let all: Vec<ScheduledTask> = self.scan(CF_SCHEDULED)?;
        let mut due: Vec<ScheduledTask> = all
            .into_iter()
            .filter(|t| t.state == TaskState::Pending && t.next_fire_at <= now)
            .collect();
        due.sort_by_key(|t| t.next_fire_at);
        Ok(due)
    }

    async fn list_running(&self) -> Result<Vec<ScheduledTask>, StorageError> {
        let all: Vec<ScheduledTask> = self.scan(CF_SCHEDULED)?;
        Ok(all
            .into_iter()
            .filter(|t| t.state == TaskState::Running)
            .collect())
    }

    async fn find_active(
        &self,
        task_type: &str,
        subject_id: &str,
    ) -> Result<Option<ScheduledTask>, StorageError> {
        let all: Vec<ScheduledTask> = self.scan(CF_SCHEDULED)?;
        Ok(all
            .into_iter()
            .filter(|t| {
                !t.state.is_terminal() && t.task_type == task_type && t.subject_id == subject_id
            })
            .max_by_key(|t| t.created_at))
    }
}

#[async_trait]
impl LeaseStore for RocksStore {
    async fn try_acquire(
        &self,
        id: &ScheduledTaskId,
        ttl_secs: u64,
    ) -> Result<bool, StorageError> {
        let _gate = self.write_gate.lock();
        let now = Utc::now();
        if let Some(expiry) = self.read::<DateTime<Utc>>(CF_LEASES, id.as_str())? {
            if expiry > now {
                return Ok(false);
            }
        }
        let expiry = now + chrono::Duration::seconds(ttl_secs as i64);
        self.write(CF_LEASES, id.as_str(), &expiry)?;
        Ok(true)
    }

    async fn renew(&self, id: &ScheduledTaskId, ttl_secs: u64) -> Result<bool, StorageError> {
        let _gate = self.write_gate.lock();
        let now = Utc::now();
        match self.read::<DateTime<Utc>>(CF_LEASES, id.as_str())? {
            Some(expiry) if expiry > now => {
                let new_expiry = now + chrono::Duration::seconds(ttl_secs as i64);
                self.write(CF_LEASES, id.as_str(), &new_expiry)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &ScheduledTaskId) -> Result<(), StorageError> {
        self.delete(CF_LEASES, id.as_str())
    }

    async fn is_held(&self, id: &ScheduledTaskId) -> Result<bool, StorageError> {
        let now = Utc::now();
        Ok(self
            .read::<DateTime<Utc>>(CF_LEASES, id.as_str())?
            .is_some_and(|expiry| expiry > now))
    }
}

#[async_trait]
impl DeadLetterStore for RocksStore {
    async fn push(&self, task: &ScheduledTask) -> Result<(), StorageError> {
        // Keyed by type then id, so a type scan lists its dead letters.
        let key = format!("{}:{}", task.task_type, task.id);
        self.write(CF_DEAD, &key, task)
    }

    async fn list(&self, task_type: &str) -> Result<Vec<ScheduledTask>, StorageError> {
        let all: Vec<ScheduledTask> = self.scan(CF_DEAD)?;
        let mut matching: Vec<ScheduledTask> = all
            .into_iter()
            .filter(|t| t.task_type == task_type)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// Idempotency port
// ---------------------------------------------------------------------------

#[async_trait]
impl IdempotencyStore for RocksStore {
    async fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: IdempotencyRecord,
    ) -> Result<bool, StorageError> {
        let _gate = self.write_gate.lock();
        let now = Utc::now();
        if let Some(existing) = self.read::<IdempotencyRecord>(CF_IDEMPOTENCY, key.as_str())? {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        self.write(CF_IDEMPOTENCY, key.as_str(), &record)?;
        Ok(true)
    }

    async fn get(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let now = Utc::now();
        Ok(self
            .read::<IdempotencyRecord>(CF_IDEMPOTENCY, key.as_str())?
            .filter(|r| !r.is_expired(now)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let handle = self
            .db
            .cf_handle(CF_IDEMPOTENCY)
            .ok_or_else(|| StorageError::Backend("missing column family idempotency".into()))?;
        let mut purged = 0;
        let mut doomed: Vec<Box<[u8]>> = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (key, value) = item.map_err(backend)?;
            let record: IdempotencyRecord = bincode::deserialize(&value).map_err(corrupt)?;
            if record.is_expired(now) {
                doomed.push(key);
            }
        }
        for key in doomed {
            self.db.delete_cf(handle, key).map_err(backend)?;
            purged += 1;
        }
        Ok(purged)
    }
}
