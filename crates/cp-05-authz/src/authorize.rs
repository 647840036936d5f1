//! OP-Code-scoped authorization.
//!
//! One function, one rule set. Transitive upward inheritance needs no
//! special casing: a shorter managed prefix covers everything a longer one
//! does, so an L4's 2-character prefix grants every L3/L2/L1 capability
//! inside its school.

use crate::errors::AuthError;
use crate::scope::EffectiveScope;
use cp_01_opcode::OpCode;
use shared_types::Role;
use tracing::debug;

/// Operations whose permission is decided by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Pickup scan at the task's pickup code.
    ScanPickup,
    /// Transit scan within the courier's own prefix.
    ScanTransit,
    /// Delivery scan at the recipient code.
    ScanDeliver,
    /// Fail scan at any code the courier covers.
    ScanFail,
    /// Accept an available task announced in a prefix room.
    AcceptTask,
    /// View a task's full (unmasked-for-level) detail.
    ViewTask,
    /// Cancel an in-transit barcode.
    CancelInTransit,
    /// Create or review subordinate couriers.
    ManageSubordinates,
}

impl Operation {
    /// Human name used in denial messages and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScanPickup => "scan:pickup",
            Self::ScanTransit => "scan:transit",
            Self::ScanDeliver => "scan:deliver",
            Self::ScanFail => "scan:fail",
            Self::AcceptTask => "task:accept",
            Self::ViewTask => "task:view",
            Self::CancelInTransit => "barcode:cancel",
            Self::ManageSubordinates => "courier:manage",
        }
    }

    /// Minimum courier level rank required, beyond prefix coverage.
    fn min_level(&self) -> u8 {
        match self {
            Self::CancelInTransit => 3,
            Self::ManageSubordinates => 2,
            _ => 1,
        }
    }
}

/// Authorize `op` for `scope` against the resource's relevant OP Code.
///
/// Admins bypass prefix checks (idempotency and audit still apply at the
/// gateway). Couriers need an approved courier scope whose managed prefix
/// covers `resource_code` and whose level meets the operation's floor.
pub fn authorize(
    op: Operation,
    scope: &EffectiveScope,
    resource_code: &OpCode,
) -> Result<(), AuthError> {
    if scope.role == Role::Admin {
        return Ok(());
    }

    let Some(courier) = &scope.courier else {
        debug!(op = op.name(), user = %scope.user_id, "Denied: not a courier");
        return Err(AuthError::PermissionDenied {
            operation: op.name(),
        });
    };

    if courier.level.rank() < op.min_level() {
        debug!(
            op = op.name(),
            level = courier.level.rank(),
            "Denied: level below operation floor"
        );
        return Err(AuthError::PermissionDenied {
            operation: op.name(),
        });
    }

    if !courier.managed_prefix.covers(resource_code) {
        debug!(
            op = op.name(),
            prefix = %courier.managed_prefix,
            code = %resource_code,
            "Denied: code outside managed prefix"
        );
        return Err(AuthError::PermissionDenied {
            operation: op.name(),
        });
    }

    Ok(())
}

/// Mask a permission failure on an OP-scoped resource.
///
/// A non-covering caller must not learn that the resource exists, so the
/// denial surfaces as `NotFound`. Token failures pass through unchanged,
/// since they reveal nothing about any resource.
#[must_use]
pub fn mask_for_probe(err: AuthError) -> AuthError {
    match err {
        AuthError::PermissionDenied { .. } => AuthError::MaskedNotFound,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::CourierScope;
    use cp_01_opcode::OpCodePrefix;
    use shared_types::{CourierId, CourierLevel, UserId};

    fn courier_scope(level: CourierLevel, prefix: &str) -> EffectiveScope {
        EffectiveScope::courier(
            UserId::from("U1"),
            CourierScope {
                courier_id: CourierId::from("C1"),
                level,
                managed_prefix: OpCodePrefix::parse(prefix).unwrap(),
            },
        )
    }

    fn code(s: &str) -> OpCode {
        OpCode::parse(s).unwrap()
    }

    #[test]
    fn test_covering_courier_allowed() {
        let scope = courier_scope(CourierLevel::L1, "PK5F3D");
        assert!(authorize(Operation::ScanPickup, &scope, &code("PK5F3D")).is_ok());
    }

    #[test]
    fn test_non_covering_courier_denied() {
        let scope = courier_scope(CourierLevel::L2, "QH1A");
        let err = authorize(Operation::ScanPickup, &scope, &code("PK5F3D")).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
    }

    #[test]
    fn test_upward_inheritance() {
        // An L4 school courier covers every code under its school prefix.
        let scope = courier_scope(CourierLevel::L4, "PK");
        for c in ["PK5F3D", "PK5F2A", "PK9Z9Z"] {
            assert!(authorize(Operation::ScanDeliver, &scope, &code(c)).is_ok());
            assert!(authorize(Operation::CancelInTransit, &scope, &code(c)).is_ok());
        }
    }

    #[test]
    fn test_level_floor_for_cancel() {
        let scope = courier_scope(CourierLevel::L1, "PK5F3D");
        let err = authorize(Operation::CancelInTransit, &scope, &code("PK5F3D")).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));

        let senior = courier_scope(CourierLevel::L3, "PK5F");
        assert!(authorize(Operation::CancelInTransit, &senior, &code("PK5F3D")).is_ok());
    }

    #[test]
    fn test_admin_bypasses_prefix() {
        let scope = EffectiveScope::admin(UserId::from("A1"));
        assert!(authorize(Operation::ScanDeliver, &scope, &code("QH1A2B")).is_ok());
        assert!(authorize(Operation::ManageSubordinates, &scope, &code("QH1A2B")).is_ok());
    }

    #[test]
    fn test_plain_user_denied() {
        let scope = EffectiveScope::user(UserId::from("U9"));
        let err = authorize(Operation::AcceptTask, &scope, &code("PK5F3D")).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied { .. }));
    }

    #[test]
    fn test_probe_masking() {
        let masked = mask_for_probe(AuthError::PermissionDenied {
            operation: "task:view",
        });
        assert_eq!(masked, AuthError::MaskedNotFound);
        // Token failures pass through.
        assert_eq!(mask_for_probe(AuthError::TokenExpired), AuthError::TokenExpired);
    }
}
