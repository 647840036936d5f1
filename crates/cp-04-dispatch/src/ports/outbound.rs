//! Outbound ports: task persistence, the courier directory and barcode
//! control. Adapters live in `cp-10-storage` and the runtime.

use crate::domain::entities::CourierTask;
use crate::domain::errors::DispatchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use shared_types::{BarcodeCode, CourierId, StorageError, TaskId};

/// Persistence for courier tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Errors with `Conflict` if the ID exists.
    async fn insert(&self, task: &CourierTask) -> Result<(), StorageError>;

    /// Fetch by ID.
    async fn get(&self, id: &TaskId) -> Result<Option<CourierTask>, StorageError>;

    /// Overwrite an existing task.
    async fn put(&self, task: &CourierTask) -> Result<(), StorageError>;

    /// Atomically claim an `available` task for `courier_id`, moving it to
    /// `accepted`. Returns `false` when the task was not available (the
    /// caller lost the race).
    async fn try_accept(
        &self,
        id: &TaskId,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Tasks currently `available` whose delivery code sits under `prefix`.
    async fn list_available_under(
        &self,
        prefix: &OpCodePrefix,
    ) -> Result<Vec<CourierTask>, StorageError>;

    /// Tasks `accepted` before `cutoff` (timeout sweeps).
    async fn list_accepted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CourierTask>, StorageError>;

    /// Non-terminal tasks assigned to a courier.
    async fn list_active_for(
        &self,
        courier_id: &CourierId,
    ) -> Result<Vec<CourierTask>, StorageError>;

    /// Number of non-terminal tasks assigned to a courier.
    async fn count_active_for(&self, courier_id: &CourierId) -> Result<usize, StorageError>;
}

/// A candidate courier as dispatch ranks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub courier_id: CourierId,
    pub level_rank: u8,
    pub managed_prefix: OpCodePrefix,
    /// Performance score per the hierarchy's pluggable weighting.
    pub score: i64,
    pub last_assignment_at: Option<DateTime<Utc>>,
}

/// Read access to the courier hierarchy, plus assignment bookkeeping.
#[async_trait]
pub trait CourierDirectory: Send + Sync {
    /// Active couriers whose managed prefix covers `code`.
    async fn candidates_covering(&self, code: &OpCode) -> Result<Vec<Candidate>, StorageError>;

    /// Note an assignment for fair rotation.
    async fn record_assignment(
        &self,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Count a delivery or failure against the courier's performance.
    async fn record_outcome(
        &self,
        courier_id: &CourierId,
        delivered: bool,
    ) -> Result<(), StorageError>;

    /// The user identity behind a courier, for notification routing.
    async fn user_of(
        &self,
        courier_id: &CourierId,
    ) -> Result<Option<shared_types::UserId>, StorageError>;
}

/// Drives the coupled barcode transitions of the scan table.
#[async_trait]
pub trait BarcodeControl: Send + Sync {
    /// `bound → in_transit` on pickup.
    async fn mark_in_transit(
        &self,
        code: &BarcodeCode,
        courier_id: &CourierId,
        at: OpCode,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError>;

    /// `in_transit → delivered` on delivery.
    async fn mark_delivered(
        &self,
        code: &BarcodeCode,
        courier_id: &CourierId,
        at: OpCode,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError>;

    /// `* → failed` on a fail scan or timeout exhaustion.
    async fn mark_failed(
        &self,
        code: &BarcodeCode,
        courier_id: Option<&CourierId>,
        at: Option<OpCode>,
        timestamp: DateTime<Utc>,
        actor_level: u8,
    ) -> Result<(), DispatchError>;
}
