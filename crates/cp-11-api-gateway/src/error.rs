//! The one error type handlers return.
//!
//! Every domain error folds into an [`ApiError`] carrying the stable wire
//! code; `IntoResponse` renders the standard envelope with the matching
//! HTTP status and the request ID.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cp_02_barcode::BarcodeError;
use cp_03_courier::CourierError;
use cp_04_dispatch::DispatchError;
use cp_05_authz::AuthError;
use shared_types::{ApiResponse, ErrorCode, RequestId, StorageError};

/// A request-scoped failure ready for the wire.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: RequestId,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: RequestId) -> Self {
        Self {
            code,
            message: message.into(),
            request_id,
        }
    }

    /// Fold any domain error (anything exposing a wire code) into an
    /// `ApiError` for this request.
    #[must_use]
    pub fn from_code(code: ErrorCode, message: String, request_id: RequestId) -> Self {
        Self {
            code,
            message,
            request_id,
        }
    }

    /// Mask resource identity on read paths: a non-covering caller learns
    /// `NotFound`, never `PermissionDenied`, so prefix layouts cannot be
    /// probed by scanning error codes.
    #[must_use]
    pub fn mask_probe(mut self) -> Self {
        if self.code == ErrorCode::PermissionDenied {
            self.code = ErrorCode::NotFound;
            self.message = "not found".to_string();
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope: ApiResponse<serde_json::Value> =
            ApiResponse::error(self.code, self.message, &self.request_id);
        let mut response = (status, Json(envelope)).into_response();
        if let Ok(value) = HeaderValue::from_str(self.request_id.as_str()) {
            response.headers_mut().insert("X-Request-ID", value);
        }
        response
    }
}

/// Adapters from each subsystem's error enum.
pub trait IntoApiError {
    fn into_api(self, request_id: &RequestId) -> ApiError;
}

impl IntoApiError for BarcodeError {
    fn into_api(self, request_id: &RequestId) -> ApiError {
        ApiError::from_code(self.error_code(), self.to_string(), request_id.clone())
    }
}

impl IntoApiError for CourierError {
    fn into_api(self, request_id: &RequestId) -> ApiError {
        ApiError::from_code(self.error_code(), self.to_string(), request_id.clone())
    }
}

impl IntoApiError for DispatchError {
    fn into_api(self, request_id: &RequestId) -> ApiError {
        ApiError::from_code(self.error_code(), self.to_string(), request_id.clone())
    }
}

impl IntoApiError for AuthError {
    fn into_api(self, request_id: &RequestId) -> ApiError {
        ApiError::from_code(self.error_code(), self.to_string(), request_id.clone())
    }
}

impl IntoApiError for StorageError {
    fn into_api(self, request_id: &RequestId) -> ApiError {
        ApiError::from_code(self.error_code(), self.to_string(), request_id.clone())
    }
}
