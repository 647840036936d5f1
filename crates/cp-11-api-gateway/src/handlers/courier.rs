//! Courier and task endpoints.

use crate::error::{ApiError, IntoApiError};
use crate::handlers::courier_actor;
use crate::retry::retry_transient;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use cp_01_opcode::{OpCode, OpCodePrefix};
use cp_03_courier::{Courier, CourierError, CourierStatus, Reviewer};
use cp_04_dispatch::{
    CourierTask, DispatchError, NextAction, ScanKind, ScanRequest, TaskStatus,
};
use cp_05_authz::{authorize, EffectiveScope, Operation};
use serde::{Deserialize, Serialize};
use shared_types::{ApiResponse, CourierId, CourierLevel, ErrorCode, RequestId, Role, TaskId, UserId};

#[derive(Debug, Serialize)]
pub struct CourierData {
    pub id: CourierId,
    pub level: u8,
    pub managed_prefix: String,
    pub status: CourierStatus,
}

impl From<Courier> for CourierData {
    fn from(courier: Courier) -> Self {
        Self {
            id: courier.id,
            level: courier.level.rank(),
            managed_prefix: courier.managed_prefix.to_string(),
            status: courier.status,
        }
    }
}

fn parse_level(rank: u8, request_id: &RequestId) -> Result<CourierLevel, ApiError> {
    CourierLevel::from_rank(rank).ok_or_else(|| {
        ApiError::new(
            ErrorCode::FieldRequired,
            format!("level must be 1..=4, got {rank}"),
            request_id.clone(),
        )
    })
}

fn parse_prefix(prefix: &str, request_id: &RequestId) -> Result<OpCodePrefix, ApiError> {
    OpCodePrefix::parse(prefix).map_err(|_| {
        ApiError::new(
            ErrorCode::MalformedCode,
            format!("malformed OP code prefix: {prefix}"),
            request_id.clone(),
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct ApplyBody {
    pub level: u8,
    pub managed_prefix: String,
}

/// `POST /courier/apply`: apply to become a courier; starts `pending`.
pub async fn apply(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<ApplyBody>,
) -> Result<Json<ApiResponse<CourierData>>, ApiError> {
    let level = parse_level(body.level, &request_id)?;
    let prefix = parse_prefix(&body.managed_prefix, &request_id)?;

    let courier = state
        .couriers
        .apply(&scope.user_id, level, prefix, Some(request_id.clone()))
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(courier.into()).with_request_id(&request_id)))
}

#[derive(Debug, Deserialize)]
pub struct SubordinateBody {
    pub user_id: UserId,
    pub level: u8,
    pub managed_prefix: String,
}

/// `POST /courier/subordinates`: L2+ creates a courier one tier down.
pub async fn create_subordinate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<SubordinateBody>,
) -> Result<Json<ApiResponse<CourierData>>, ApiError> {
    let actor = courier_actor(&scope, &request_id)?;
    if actor.level_rank < 2 {
        return Err(ApiError::new(
            ErrorCode::PermissionDenied,
            "creating subordinates requires level 2 or above",
            request_id,
        ));
    }
    let level = parse_level(body.level, &request_id)?;
    let prefix = parse_prefix(&body.managed_prefix, &request_id)?;

    let courier = state
        .couriers
        .create_subordinate(
            &actor.courier_id,
            level,
            prefix,
            &body.user_id,
            Some(request_id.clone()),
        )
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(courier.into()).with_request_id(&request_id)))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub courier_id: CourierId,
    pub approve: bool,
}

/// `POST /courier/review`: approve or reject a pending courier.
pub async fn review(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ApiResponse<CourierData>>, ApiError> {
    let reviewer = if scope.role == Role::Admin {
        Reviewer::Admin
    } else {
        let actor = courier_actor(&scope, &request_id)?;
        Reviewer::Courier(actor.courier_id)
    };

    let courier = state
        .couriers
        .review(reviewer, &body.courier_id, body.approve, Some(request_id.clone()))
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(courier.into()).with_request_id(&request_id)))
}

#[derive(Debug, Serialize)]
pub struct TaskData {
    pub id: TaskId,
    pub barcode_code: String,
    pub pickup_op_code: String,
    pub delivery_op_code: String,
    pub current_op_code: String,
    pub status: TaskStatus,
    pub attempts: u32,
}

impl From<CourierTask> for TaskData {
    fn from(task: CourierTask) -> Self {
        Self {
            id: task.id,
            barcode_code: task.barcode_code.to_string(),
            pickup_op_code: task.pickup_op_code.to_string(),
            delivery_op_code: task.delivery_op_code.to_string(),
            current_op_code: task.current_op_code.to_string(),
            status: task.status,
            attempts: task.attempts,
        }
    }
}

/// `GET /courier/tasks`: the caller's active tasks plus unclaimed tasks in
/// their area.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<ApiResponse<Vec<TaskData>>>, ApiError> {
    let actor = courier_actor(&scope, &request_id)?;
    let tasks = state
        .dispatch
        .tasks_for_courier(&actor)
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(tasks.into_iter().map(TaskData::from).collect())
            .with_request_id(&request_id),
    ))
}

/// `POST /courier/tasks/{id}/accept`: claim an available task; exactly one
/// caller wins, the rest get `AlreadyTaken`.
pub async fn accept_task(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TaskData>>, ApiError> {
    let actor = courier_actor(&scope, &request_id)?;
    let task_id = TaskId::from(id.as_str());

    // Fetch for the authorization target; a task outside the caller's
    // scope must read as missing.
    let task = state
        .dispatch
        .get(&task_id)
        .await
        .map_err(|e| e.into_api(&request_id))?;
    authorize(Operation::AcceptTask, &scope, &task.delivery_op_code)
        .map_err(|e| e.into_api(&request_id).mask_probe())?;

    let accepted = state
        .dispatch
        .accept(&task_id, &actor, Some(request_id.clone()))
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(accepted.into()).with_request_id(&request_id)))
}

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub kind: ScanKind,
    pub at_op_code: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// `POST /courier/tasks/{id}/scan`: drive the task (and its barcode)
/// forward with a validated scan.
pub async fn scan_task(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<String>,
    Json(body): Json<ScanBody>,
) -> Result<Json<ApiResponse<TaskData>>, ApiError> {
    let actor = courier_actor(&scope, &request_id)?;
    let at = OpCode::parse(&body.at_op_code).map_err(|_| {
        ApiError::new(
            ErrorCode::MalformedCode,
            format!("malformed OP code: {}", body.at_op_code),
            request_id.clone(),
        )
    })?;

    let operation = match body.kind {
        ScanKind::Pickup => Operation::ScanPickup,
        ScanKind::Transit | ScanKind::Handoff => Operation::ScanTransit,
        ScanKind::Deliver => Operation::ScanDeliver,
        ScanKind::Fail => Operation::ScanFail,
    };
    authorize(operation, &scope, &at).map_err(|e| e.into_api(&request_id))?;

    let scan = ScanRequest {
        kind: body.kind,
        at_op_code: at,
        timestamp: Utc::now(),
        note: body.note.clone(),
    };
    let task_id = TaskId::from(id.as_str());
    let task = retry_transient(
        || {
            let scan = scan.clone();
            let task_id = task_id.clone();
            let actor = actor.clone();
            let dispatch = state.dispatch.clone();
            let rid = request_id.clone();
            async move { dispatch.scan(&task_id, &actor, scan, Some(rid)).await }
        },
        DispatchError::error_code,
    )
    .await
    .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(task.into()).with_request_id(&request_id)))
}

/// `GET /courier/tasks/{id}/next`: the next-action hint with its ETA.
pub async fn next_action(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<NextAction>>, ApiError> {
    let task_id = TaskId::from(id.as_str());
    let task = state
        .dispatch
        .get(&task_id)
        .await
        .map_err(|e| e.into_api(&request_id))?;
    // Read path: non-covering callers learn nothing.
    authorize(Operation::ViewTask, &scope, &task.delivery_op_code)
        .map_err(|e| e.into_api(&request_id).mask_probe())?;

    let hint = state
        .dispatch
        .next_action(&task_id)
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(hint).with_request_id(&request_id)))
}

/// `POST /courier/promote`: promote a courier with a new prefix.
#[derive(Debug, Deserialize)]
pub struct PromoteBody {
    pub courier_id: CourierId,
    pub new_prefix: String,
}

pub async fn promote(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Json(body): Json<PromoteBody>,
) -> Result<Json<ApiResponse<CourierData>>, ApiError> {
    if scope.role != Role::Admin {
        let actor = courier_actor(&scope, &request_id)?;
        // Only a courier's ancestors (or admins) may promote it.
        let subordinates = state
            .couriers
            .list_subordinates(&actor.courier_id, true)
            .await
            .map_err(|e| e.into_api(&request_id))?;
        if !subordinates.iter().any(|c| c.id == body.courier_id) {
            return Err(ApiError::new(
                ErrorCode::PermissionDenied,
                "only ancestors may promote a courier",
                request_id,
            )
            .mask_probe());
        }
    }
    let prefix = parse_prefix(&body.new_prefix, &request_id)?;

    let courier = retry_transient(
        || {
            let courier_id = body.courier_id.clone();
            let couriers = state.couriers.clone();
            let rid = request_id.clone();
            async move { couriers.promote(&courier_id, prefix, Some(rid)).await }
        },
        CourierError::error_code,
    )
    .await
    .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(ApiResponse::ok(courier.into()).with_request_id(&request_id)))
}

/// `GET /courier/subordinates`: direct subordinates of the caller.
pub async fn list_subordinates(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
) -> Result<Json<ApiResponse<Vec<CourierData>>>, ApiError> {
    let actor = courier_actor(&scope, &request_id)?;
    let subordinates = state
        .couriers
        .list_subordinates(&actor.courier_id, false)
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(subordinates.into_iter().map(CourierData::from).collect())
            .with_request_id(&request_id),
    ))
}
