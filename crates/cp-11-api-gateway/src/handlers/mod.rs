//! Request handlers, grouped by resource.

pub mod barcodes;
pub mod courier;
pub mod health;
pub mod opcode;

use crate::error::ApiError;
use cp_04_dispatch::ScanActor;
use cp_05_authz::EffectiveScope;
use shared_types::{ErrorCode, RequestId};

/// The courier identity behind a scope, or 403.
pub(crate) fn courier_actor(
    scope: &EffectiveScope,
    request_id: &RequestId,
) -> Result<ScanActor, ApiError> {
    let courier = scope.courier.as_ref().ok_or_else(|| {
        ApiError::new(
            ErrorCode::PermissionDenied,
            "courier role required",
            request_id.clone(),
        )
    })?;
    Ok(ScanActor {
        courier_id: courier.courier_id.clone(),
        level_rank: courier.level.rank(),
        managed_prefix: courier.managed_prefix,
    })
}
