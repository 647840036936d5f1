//! Effective request scope.
//!
//! Computed once per request from the verified claims plus the courier
//! directory; every downstream permission check and privacy mask reads it.

use cp_01_opcode::{OpCodePrefix, ViewerScope};
use serde::{Deserialize, Serialize};
use shared_types::{CourierId, CourierLevel, Role, UserId};

/// Courier attributes attached to a scope when the caller is an approved
/// courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierScope {
    pub courier_id: CourierId,
    pub level: CourierLevel,
    pub managed_prefix: OpCodePrefix,
}

/// What one request is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveScope {
    pub user_id: UserId,
    pub role: Role,
    pub courier: Option<CourierScope>,
    /// 2-character school code, when the token or courier record carries
    /// one. Drives the hub's school-room auto-join.
    pub school_code: Option<String>,
}

impl EffectiveScope {
    /// A plain user scope.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
            courier: None,
            school_code: None,
        }
    }

    /// An admin scope.
    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            courier: None,
            school_code: None,
        }
    }

    /// A courier scope.
    #[must_use]
    pub fn courier(user_id: UserId, courier: CourierScope) -> Self {
        let school_code = courier
            .managed_prefix
            .truncate(2)
            .ok()
            .map(|p| p.as_str().to_string());
        Self {
            user_id,
            role: Role::Courier,
            courier: Some(courier),
            school_code,
        }
    }

    /// Attach a school code (from token claims) to the scope.
    #[must_use]
    pub fn with_school(mut self, school: Option<String>) -> Self {
        if school.is_some() {
            self.school_code = school;
        }
        self
    }

    /// Courier level rank, if the caller is a courier.
    #[must_use]
    pub fn courier_level(&self) -> Option<u8> {
        self.courier.as_ref().map(|c| c.level.rank())
    }

    /// The privacy-mask scope for rendering OP Codes to this caller.
    ///
    /// Admins see full codes, like L4 couriers.
    #[must_use]
    pub fn viewer_scope(&self) -> ViewerScope {
        match self.role {
            Role::Admin => ViewerScope::CourierL4,
            _ => ViewerScope::from_courier_level(self.courier_level()),
        }
    }

    /// True iff this scope is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
