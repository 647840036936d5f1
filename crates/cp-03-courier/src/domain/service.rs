//! The hierarchy service: creation, review, promotion, claim resolution.

use super::entities::{
    ApprovalKind, ApprovalRecord, Courier, CourierStatus, PerformanceCounters,
};
use super::errors::CourierError;
use super::score::PerformanceScore;
use crate::ports::outbound::CourierStore;
use chrono::{DateTime, Utc};
use cp_01_opcode::{OpCode, OpCodePrefix};
use shared_bus::{EventPublisher, PlatformEvent};
use shared_types::{CourierId, CourierLevel, RequestId, UserId};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

/// Hierarchy configuration.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    /// Managed-prefix length for L2 couriers. The documented default is 4;
    /// deployments that run L2 at school scope set 2.
    pub l2_prefix_len: usize,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self { l2_prefix_len: 4 }
    }
}

impl CourierConfig {
    /// Expected managed-prefix length for a level under this configuration.
    #[must_use]
    pub fn expected_prefix_len(&self, level: CourierLevel) -> usize {
        match level {
            CourierLevel::L2 => self.l2_prefix_len,
            other => other.managed_prefix_len(),
        }
    }
}

/// Who is performing a review.
#[derive(Debug, Clone)]
pub enum Reviewer {
    /// A courier, subject to the outranking rule.
    Courier(CourierId),
    /// Platform admin; bypasses rank checks but is still recorded.
    Admin,
}

/// The courier hierarchy service.
pub struct CourierService {
    store: Arc<dyn CourierStore>,
    bus: Arc<dyn EventPublisher>,
    score: Arc<dyn PerformanceScore>,
    config: CourierConfig,
}

impl CourierService {
    pub fn new(
        store: Arc<dyn CourierStore>,
        bus: Arc<dyn EventPublisher>,
        score: Arc<dyn PerformanceScore>,
        config: CourierConfig,
    ) -> Self {
        Self {
            store,
            bus,
            score,
            config,
        }
    }

    /// A user applies to become a courier at `level` over `prefix`.
    ///
    /// The record starts `pending` with no parent; review assigns it into
    /// the tree.
    pub async fn apply(
        &self,
        user_id: &UserId,
        level: CourierLevel,
        prefix: OpCodePrefix,
        request_id: Option<RequestId>,
    ) -> Result<Courier, CourierError> {
        self.check_prefix_shape(level, &prefix)?;
        self.check_claim_free(level, &prefix).await?;

        let courier = Courier {
            id: CourierId::generate(),
            user_id: user_id.clone(),
            level,
            managed_prefix: prefix,
            parent_courier_id: None,
            status: CourierStatus::Pending,
            counters: PerformanceCounters::default(),
            approvals: Vec::new(),
            created_at: Utc::now(),
        };
        self.store.insert(&courier).await?;
        self.emit_status(&courier, request_id).await;
        Ok(courier)
    }

    /// A courier creates a direct subordinate one tier down.
    ///
    /// Allowed iff `creator.level == level + 1` and the creator's managed
    /// prefix contains the new prefix. An equal-length claim on the same
    /// prefix is an invariant violation and is rejected here, at creation.
    pub async fn create_subordinate(
        &self,
        creator_id: &CourierId,
        level: CourierLevel,
        prefix: OpCodePrefix,
        user_id: &UserId,
        request_id: Option<RequestId>,
    ) -> Result<Courier, CourierError> {
        let creator = self.fetch(creator_id).await?;
        if !creator.is_active() {
            return Err(CourierError::WrongStatus {
                id: creator.id.to_string(),
                status: creator.status.as_str(),
                required: "approved",
            });
        }
        if creator.level.rank() != level.rank() + 1 {
            return Err(CourierError::WrongCreatorLevel {
                creator_level: creator.level.rank(),
                target_level: level.rank(),
            });
        }
        if !creator.managed_prefix.contains_prefix(&prefix) {
            return Err(CourierError::PrefixOutsideScope {
                prefix: prefix.to_string(),
                managed: creator.managed_prefix.to_string(),
            });
        }
        self.check_prefix_shape(level, &prefix)?;
        self.check_claim_free(level, &prefix).await?;

        let courier = Courier {
            id: CourierId::generate(),
            user_id: user_id.clone(),
            level,
            managed_prefix: prefix,
            parent_courier_id: Some(creator.id.clone()),
            status: CourierStatus::Pending,
            counters: PerformanceCounters::default(),
            approvals: Vec::new(),
            created_at: Utc::now(),
        };
        self.store.insert(&courier).await?;
        info!(
            courier = %courier.id,
            creator = %creator.id,
            level = level.rank(),
            prefix = %courier.managed_prefix,
            "Subordinate courier created"
        );
        self.emit_status(&courier, request_id).await;
        Ok(courier)
    }

    /// Review a pending courier: approve or reject.
    ///
    /// Courier reviewers must satisfy `reviewer.level >= courier.level + 1`.
    pub async fn review(
        &self,
        reviewer: Reviewer,
        courier_id: &CourierId,
        approve: bool,
        request_id: Option<RequestId>,
    ) -> Result<Courier, CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        if courier.status != CourierStatus::Pending {
            return Err(CourierError::WrongStatus {
                id: courier.id.to_string(),
                status: courier.status.as_str(),
                required: "pending",
            });
        }

        let reviewer_id = match reviewer {
            Reviewer::Admin => CourierId::from("admin"),
            Reviewer::Courier(id) => {
                let reviewing = self.fetch(&id).await?;
                if reviewing.level.rank() < courier.level.rank() + 1 {
                    return Err(CourierError::ReviewerOutranked {
                        reviewer_level: reviewing.level.rank(),
                        target_level: courier.level.rank(),
                    });
                }
                // A reviewing courier adopts an orphaned applicant.
                if courier.parent_courier_id.is_none()
                    && reviewing.level.rank() == courier.level.rank() + 1
                {
                    courier.parent_courier_id = Some(reviewing.id.clone());
                }
                id
            }
        };

        courier.approvals.push(ApprovalRecord {
            reviewer_id,
            kind: ApprovalKind::Application,
            approved: approve,
            at: Utc::now(),
            note: None,
        });
        courier.status = if approve {
            CourierStatus::Approved
        } else {
            CourierStatus::Rejected
        };
        self.store.put(&courier).await?;
        self.emit_status(&courier, request_id).await;
        Ok(courier)
    }

    /// Suspend an approved courier.
    pub async fn suspend(
        &self,
        courier_id: &CourierId,
        request_id: Option<RequestId>,
    ) -> Result<Courier, CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        if courier.status != CourierStatus::Approved {
            return Err(CourierError::WrongStatus {
                id: courier.id.to_string(),
                status: courier.status.as_str(),
                required: "approved",
            });
        }
        courier.status = CourierStatus::Suspended;
        self.store.put(&courier).await?;
        self.emit_status(&courier, request_id).await;
        Ok(courier)
    }

    /// Record a parent's consent decision on a subordinate.
    pub async fn record_consent(
        &self,
        parent_id: &CourierId,
        courier_id: &CourierId,
        kind: ApprovalKind,
        approved: bool,
    ) -> Result<(), CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        if courier.parent_courier_id.as_ref() != Some(parent_id) {
            return Err(CourierError::ConsentRequired);
        }
        courier.approvals.push(ApprovalRecord {
            reviewer_id: parent_id.clone(),
            kind,
            approved,
            at: Utc::now(),
            note: None,
        });
        self.store.put(&courier).await?;
        Ok(())
    }

    /// Promote a courier one tier up with a new managed prefix.
    ///
    /// Requires the performance threshold for the current level. A new
    /// prefix that does not contain the old one narrows the courier's
    /// territory and needs the parent's recorded consent.
    pub async fn promote(
        &self,
        courier_id: &CourierId,
        new_prefix: OpCodePrefix,
        request_id: Option<RequestId>,
    ) -> Result<Courier, CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        if !courier.is_active() {
            return Err(CourierError::WrongStatus {
                id: courier.id.to_string(),
                status: courier.status.as_str(),
                required: "approved",
            });
        }
        let next_level = courier.level.parent().ok_or(CourierError::AtTopLevel)?;

        let score = self.score.score(&courier.counters);
        let threshold = self.score.promotion_threshold(courier.level.rank());
        if score < threshold {
            return Err(CourierError::BelowThreshold { score, threshold });
        }

        self.check_prefix_shape(next_level, &new_prefix)?;
        self.check_claim_free(next_level, &new_prefix).await?;

        let narrows = !new_prefix.contains_prefix(&courier.managed_prefix);
        if narrows {
            let consented = courier.approvals.iter().any(|a| {
                a.kind == ApprovalKind::PrefixNarrowing
                    && a.approved
                    && Some(&a.reviewer_id) == courier.parent_courier_id.as_ref()
            });
            if !consented {
                return Err(CourierError::ConsentRequired);
            }
        }

        // The promoted courier moves up under its grandparent.
        let new_parent = match &courier.parent_courier_id {
            Some(parent_id) => self.fetch(parent_id).await?.parent_courier_id,
            None => None,
        };

        courier.level = next_level;
        courier.managed_prefix = new_prefix;
        courier.parent_courier_id = new_parent;
        courier.approvals.push(ApprovalRecord {
            reviewer_id: CourierId::from("system"),
            kind: ApprovalKind::Promotion,
            approved: true,
            at: Utc::now(),
            note: Some(format!("score {score} >= threshold {threshold}")),
        });
        self.store.put(&courier).await?;
        info!(
            courier = %courier.id,
            level = courier.level.rank(),
            prefix = %courier.managed_prefix,
            "Courier promoted"
        );
        self.emit_status(&courier, request_id).await;
        Ok(courier)
    }

    /// Direct subordinates, or the whole subtree when `transitive`.
    pub async fn list_subordinates(
        &self,
        courier_id: &CourierId,
        transitive: bool,
    ) -> Result<Vec<Courier>, CourierError> {
        let mut result = Vec::new();
        let mut frontier = VecDeque::from([courier_id.clone()]);
        while let Some(id) = frontier.pop_front() {
            let children = self.store.list_children(&id).await?;
            for child in children {
                if transitive {
                    frontier.push_back(child.id.clone());
                }
                result.push(child);
            }
            if !transitive {
                break;
            }
        }
        Ok(result)
    }

    /// Resolve which active courier's claim wins for a code: the longest
    /// matching managed prefix. An equal-length tie is an invariant
    /// violation surfaced as a conflict.
    pub async fn resolve_claim(&self, code: &OpCode) -> Result<Option<Courier>, CourierError> {
        let covering = self.store.list_covering(code).await?;
        let mut best: Option<Courier> = None;
        let mut tie = false;
        for courier in covering.into_iter().filter(Courier::is_active) {
            match &best {
                None => best = Some(courier),
                Some(current) => {
                    let (a, b) = (courier.managed_prefix.len(), current.managed_prefix.len());
                    if a > b {
                        best = Some(courier);
                        tie = false;
                    } else if a == b {
                        tie = true;
                    }
                }
            }
        }
        if tie {
            return Err(CourierError::PrefixAlreadyClaimed {
                prefix: code.to_string(),
            });
        }
        Ok(best)
    }

    /// Fetch a courier by ID.
    pub async fn get(&self, id: &CourierId) -> Result<Courier, CourierError> {
        self.fetch(id).await
    }

    /// Fetch the courier record for a user identity.
    pub async fn get_by_user(&self, user_id: &UserId) -> Result<Option<Courier>, CourierError> {
        Ok(self.store.get_by_user(user_id).await?)
    }

    /// Active couriers covering a delivery code, for dispatch ranking.
    pub async fn list_active_covering(
        &self,
        code: &OpCode,
    ) -> Result<Vec<Courier>, CourierError> {
        let covering = self.store.list_covering(code).await?;
        Ok(covering.into_iter().filter(Courier::is_active).collect())
    }

    /// Record a delivery outcome against a courier's counters.
    pub async fn record_outcome(
        &self,
        courier_id: &CourierId,
        delivered: bool,
    ) -> Result<(), CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        if delivered {
            courier.counters.delivered += 1;
        } else {
            courier.counters.failed += 1;
        }
        self.store.put(&courier).await?;
        Ok(())
    }

    /// Record that a task was assigned to a courier, for fair rotation.
    pub async fn record_assignment(
        &self,
        courier_id: &CourierId,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let mut courier = self.fetch(courier_id).await?;
        courier.counters.last_assignment_at = Some(at);
        self.store.put(&courier).await?;
        Ok(())
    }

    fn check_prefix_shape(
        &self,
        level: CourierLevel,
        prefix: &OpCodePrefix,
    ) -> Result<(), CourierError> {
        let expected = self.config.expected_prefix_len(level);
        if prefix.len() != expected {
            return Err(CourierError::PrefixLengthMismatch {
                prefix: prefix.to_string(),
                actual: prefix.len(),
                expected,
            });
        }
        Ok(())
    }

    async fn check_claim_free(
        &self,
        level: CourierLevel,
        prefix: &OpCodePrefix,
    ) -> Result<(), CourierError> {
        let claims = self.store.list_claiming(prefix).await?;
        let contested = claims
            .iter()
            .any(|c| c.level == level && c.status != CourierStatus::Rejected);
        if contested {
            return Err(CourierError::PrefixAlreadyClaimed {
                prefix: prefix.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, id: &CourierId) -> Result<Courier, CourierError> {
        match self.store.get(id).await {
            Ok(Some(courier)) => Ok(courier),
            Ok(None) => Err(CourierError::NotFound { id: id.to_string() }),
            Err(e) => Err(CourierError::Storage(e)),
        }
    }

    async fn emit_status(&self, courier: &Courier, request_id: Option<RequestId>) {
        self.bus
            .publish(
                PlatformEvent::CourierStatusChanged {
                    courier_id: courier.id.clone(),
                    user_id: courier.user_id.clone(),
                    new_status: courier.status.as_str().to_string(),
                },
                request_id,
            )
            .await;
    }
}
