//! Outbound ports implemented by the persistence layer.
//!
//! Conceptual keyspace layout, per the KV store:
//! `delay:<type>` ordered by fire time, `lease:<task_id>` with TTL,
//! `dead:<type>` as the dead-letter set.

use crate::domain::entities::ScheduledTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{ScheduledTaskId, StorageError};

/// Persistence for scheduled tasks.
#[async_trait]
pub trait ScheduledTaskStore: Send + Sync {
    /// Insert a new task. Errors with `Conflict` if the ID exists.
    async fn insert(&self, task: &ScheduledTask) -> Result<(), StorageError>;

    /// Fetch by ID.
    async fn get(&self, id: &ScheduledTaskId) -> Result<Option<ScheduledTask>, StorageError>;

    /// Overwrite an existing task.
    async fn put(&self, task: &ScheduledTask) -> Result<(), StorageError>;

    /// Pending tasks due at or before `now`, ordered by fire time.
    async fn due_before(&self, now: DateTime<Utc>)
        -> Result<Vec<ScheduledTask>, StorageError>;

    /// Tasks currently marked running (lease-recovery sweep).
    async fn list_running(&self) -> Result<Vec<ScheduledTask>, StorageError>;

    /// The newest non-terminal task for a `(type, subject)` pair, if any.
    /// Used to make recurring-job registration idempotent across restarts.
    async fn find_active(
        &self,
        task_type: &str,
        subject_id: &str,
    ) -> Result<Option<ScheduledTask>, StorageError>;
}

/// Worker leases keyed by task ID.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Claim the lease for `ttl_secs`. Returns `false` if another worker
    /// holds a live lease.
    async fn try_acquire(
        &self,
        id: &ScheduledTaskId,
        ttl_secs: u64,
    ) -> Result<bool, StorageError>;

    /// Extend a held lease.
    async fn renew(&self, id: &ScheduledTaskId, ttl_secs: u64) -> Result<bool, StorageError>;

    /// Release a held lease.
    async fn release(&self, id: &ScheduledTaskId) -> Result<(), StorageError>;

    /// True if a live lease exists for `id`.
    async fn is_held(&self, id: &ScheduledTaskId) -> Result<bool, StorageError>;
}

/// Dead-letter set, keyed by task type.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Add a task (with its final error) to the set.
    async fn push(&self, task: &ScheduledTask) -> Result<(), StorageError>;

    /// Dead letters of one type, newest first.
    async fn list(&self, task_type: &str) -> Result<Vec<ScheduledTask>, StorageError>;
}
