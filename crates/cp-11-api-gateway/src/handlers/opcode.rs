//! OP Code lookup, privacy-masked per viewer.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use cp_01_opcode::{mask, OpCode};
use cp_05_authz::EffectiveScope;
use serde::Serialize;
use shared_types::{ApiResponse, ErrorCode, RequestId};

#[derive(Debug, Serialize)]
pub struct OpCodeData {
    /// The code as this viewer may see it, `*` at masked positions.
    pub code: String,
    pub school: String,
}

/// `GET /opcode/{code}`: view a code at the caller's privacy level.
pub async fn get(
    State(_state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(scope): Extension<EffectiveScope>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<OpCodeData>>, ApiError> {
    let parsed = OpCode::parse(&code).map_err(|_| {
        ApiError::new(
            ErrorCode::MalformedCode,
            format!("malformed OP code: {code}"),
            request_id.clone(),
        )
    })?;

    let masked = mask(&parsed, scope.viewer_scope());
    Ok(Json(
        ApiResponse::ok(OpCodeData {
            school: parsed.school().to_string(),
            code: masked,
        })
        .with_request_id(&request_id),
    ))
}
