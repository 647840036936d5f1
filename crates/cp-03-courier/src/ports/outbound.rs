//! Outbound ports implemented by the persistence layer.

use crate::domain::entities::Courier;
use async_trait::async_trait;
use cp_01_opcode::{OpCode, OpCodePrefix};
use shared_types::{CourierId, StorageError, UserId};

/// Persistence for courier records.
#[async_trait]
pub trait CourierStore: Send + Sync {
    /// Insert a new courier. Errors with `Conflict` if the ID exists.
    async fn insert(&self, courier: &Courier) -> Result<(), StorageError>;

    /// Fetch by courier ID.
    async fn get(&self, id: &CourierId) -> Result<Option<Courier>, StorageError>;

    /// Fetch the courier record behind a user identity, if any.
    async fn get_by_user(&self, user_id: &UserId) -> Result<Option<Courier>, StorageError>;

    /// Overwrite an existing courier.
    async fn put(&self, courier: &Courier) -> Result<(), StorageError>;

    /// Direct children of a courier.
    async fn list_children(&self, parent_id: &CourierId) -> Result<Vec<Courier>, StorageError>;

    /// Couriers (any status) whose managed prefix covers `code`.
    async fn list_covering(&self, code: &OpCode) -> Result<Vec<Courier>, StorageError>;

    /// Couriers (any status) managing exactly `prefix`.
    async fn list_claiming(&self, prefix: &OpCodePrefix) -> Result<Vec<Courier>, StorageError>;
}
