//! Barcode endpoints.

use crate::error::{ApiError, IntoApiError};
use crate::handlers::courier_actor;
use crate::retry::retry_transient;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use cp_01_opcode::{mask, OpCode};
use cp_02_barcode::domain::entities::{BarcodeStatus, GenerationContext, ScanEvent};
use cp_02_barcode::{BarcodeError, BindRequest};
use cp_05_authz::{authorize, EffectiveScope, Operation};
use serde::{Deserialize, Serialize};
use shared_types::{ApiResponse, BarcodeCode, EnvelopeId, ErrorCode, LetterId, RequestId};

#[derive(Debug, Deserialize)]
pub struct CreateBarcodeBody {
    pub letter_id: LetterId,
}

#[derive(Debug, Serialize)]
pub struct CreateBarcodeData {
    pub code: BarcodeCode,
    pub qr_payload: cp_02_barcode::domain::entities::QrPayload,
}

/// `POST /barcodes`: issue a barcode for a draft letter. Idempotent via
/// the idempotency middleware.
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<CreateBarcodeBody>,
) -> Result<Json<ApiResponse<CreateBarcodeData>>, ApiError> {
    let (barcode, qr) = retry_transient(
        || {
            let mut ctx = GenerationContext::single();
            let letter_id = body.letter_id.clone();
            let barcodes = state.barcodes.clone();
            async move { barcodes.create(&letter_id, &mut ctx).await }
        },
        BarcodeError::error_code,
    )
    .await
    .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(CreateBarcodeData {
            code: barcode.code,
            qr_payload: qr,
        })
        .with_request_id(&request_id),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BindBody {
    pub envelope_id: EnvelopeId,
    pub recipient_op_code: String,
    #[serde(default)]
    pub reveal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BarcodeData {
    pub code: BarcodeCode,
    pub status: BarcodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_op_code: Option<String>,
}

/// `PATCH /barcodes/{code}/bind`: attach letter, envelope and recipient.
pub async fn bind(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(code): Path<String>,
    Json(body): Json<BindBody>,
) -> Result<Json<ApiResponse<BarcodeData>>, ApiError> {
    let recipient = OpCode::parse(&body.recipient_op_code).map_err(|_| {
        ApiError::new(
            ErrorCode::MalformedCode,
            format!("malformed recipient OP code: {}", body.recipient_op_code),
            request_id.clone(),
        )
    })?;

    let request = BindRequest {
        code: BarcodeCode::from(code.as_str()),
        envelope_id: body.envelope_id.clone(),
        recipient_op_code: recipient,
        reveal_at: body.reveal_at,
    };
    let barcode = retry_transient(
        || {
            let request = request.clone();
            let barcodes = state.barcodes.clone();
            let rid = request_id.clone();
            async move { barcodes.bind(request, Some(rid)).await }
        },
        BarcodeError::error_code,
    )
    .await
    .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(BarcodeData {
            code: barcode.code,
            status: barcode.status,
            recipient_op_code: barcode.recipient_op_code.map(|c| c.to_string()),
        })
        .with_request_id(&request_id),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub new_status: BarcodeStatus,
    pub at_op_code: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// `PATCH /barcodes/{code}/status`: a direct barcode scan, validated like
/// any other: courier scope at the scan location, then the state machine.
pub async fn status(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(code): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<ApiResponse<BarcodeData>>, ApiError> {
    let at = OpCode::parse(&body.at_op_code).map_err(|_| {
        ApiError::new(
            ErrorCode::MalformedCode,
            format!("malformed OP code: {}", body.at_op_code),
            request_id.clone(),
        )
    })?;

    let operation = match body.new_status {
        BarcodeStatus::InTransit => Operation::ScanPickup,
        BarcodeStatus::Delivered => Operation::ScanDeliver,
        BarcodeStatus::Failed => Operation::ScanFail,
        BarcodeStatus::Cancelled => Operation::CancelInTransit,
        _ => {
            return Err(ApiError::new(
                ErrorCode::InvalidTransition,
                format!("{} is not a scannable status", body.new_status),
                request_id,
            ))
        }
    };
    authorize(operation, &scope, &at).map_err(|e| e.into_api(&request_id))?;
    let actor = courier_actor(&scope, &request_id)?;

    let scan = ScanEvent {
        courier_id: actor.courier_id.clone(),
        at_op_code: at,
        new_status: body.new_status,
        timestamp: Utc::now(),
        note: body.note.clone(),
    };
    let barcode_code = BarcodeCode::from(code.as_str());
    let barcode = retry_transient(
        || {
            let scan = scan.clone();
            let barcode_code = barcode_code.clone();
            let barcodes = state.barcodes.clone();
            let rid = request_id.clone();
            let level = actor.level_rank;
            async move {
                barcodes
                    .transition(scan, &barcode_code, Some(level), Some(rid))
                    .await
            }
        },
        BarcodeError::error_code,
    )
    .await
    .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(BarcodeData {
            code: barcode.code,
            status: barcode.status,
            recipient_op_code: barcode
                .recipient_op_code
                .map(|c| mask(&c, scope.viewer_scope())),
        })
        .with_request_id(&request_id),
    ))
}

/// `GET /barcodes/{code}`: barcode state with the recipient code masked
/// for the viewer.
pub async fn get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<BarcodeData>>, ApiError> {
    let barcode = state
        .barcodes
        .get(&BarcodeCode::from(code.as_str()))
        .await
        .map_err(|e| e.into_api(&request_id))?;

    Ok(Json(
        ApiResponse::ok(BarcodeData {
            code: barcode.code,
            status: barcode.status,
            recipient_op_code: barcode
                .recipient_op_code
                .map(|c| mask(&c, scope.viewer_scope())),
        })
        .with_request_id(&request_id),
    ))
}
