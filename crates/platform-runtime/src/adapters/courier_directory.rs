//! Dispatch's view of the courier hierarchy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cp_01_opcode::OpCode;
use cp_03_courier::{CourierService, PerformanceScore};
use cp_04_dispatch::{Candidate, CourierDirectory};
use shared_types::{CourierId, StorageError, UserId};
use std::sync::Arc;

/// Implements the dispatch engine's directory port over the courier
/// service, applying the configured performance scoring.
pub struct CourierDirectoryAdapter {
    couriers: Arc<CourierService>,
    score: Arc<dyn PerformanceScore>,
}

impl CourierDirectoryAdapter {
    pub fn new(couriers: Arc<CourierService>, score: Arc<dyn PerformanceScore>) -> Self {
        Self { couriers, score }
    }

    fn storage_err(e: cp_03_courier::CourierError) -> StorageError {
        StorageError::Backend(e.to_string())
    }
}

#[async_trait]
impl CourierDirectory for CourierDirectoryAdapter {
    async fn candidates_covering(&self, code: &OpCode) -> Result<Vec<Candidate>, StorageError> {
        let covering = self
            .couriers
            .list_active_covering(code)
            .await
            .map_err(Self::storage_err)?;
        Ok(covering
            .into_iter()
            .map(|courier| Candidate {
                score: self.score.score(&courier.counters),
                courier_id: courier.id,
                level_rank: courier.level.rank(),
                managed_prefix: courier.managed_prefix,
                last_assignment_at: courier.counters.last_assignment_at,
            })
            .collect())
    }

    async fn record_assignment(
        &self,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.couriers
            .record_assignment(courier_id, at)
            .await
            .map_err(Self::storage_err)
    }

    async fn record_outcome(
        &self,
        courier_id: &CourierId,
        delivered: bool,
    ) -> Result<(), StorageError> {
        self.couriers
            .record_outcome(courier_id, delivered)
            .await
            .map_err(Self::storage_err)
    }

    async fn user_of(&self, courier_id: &CourierId) -> Result<Option<UserId>, StorageError> {
        match self.couriers.get(courier_id).await {
            Ok(courier) => Ok(Some(courier.user_id)),
            Err(cp_03_courier::CourierError::NotFound { .. }) => Ok(None),
            Err(e) => Err(Self::storage_err(e)),
        }
    }
}
