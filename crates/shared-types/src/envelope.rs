//! The standard API response envelope and request identity.

use crate::errors::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Request identity propagated across every log line and outbound call.
///
/// Generated at the edge unless the client supplies `X-Request-ID`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Mint a fresh request ID at the edge.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied header value, if usable.
    ///
    /// Values longer than 128 characters or containing non-printable ASCII
    /// are discarded and a fresh ID minted instead.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        let usable = !value.is_empty()
            && value.len() <= 128
            && value.bytes().all(|b| (0x21..=0x7e).contains(&b));
        if usable {
            Self(value.to_string())
        } else {
            Self::generate()
        }
    }

    /// The ID as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `{code, msg, data, timestamp}` envelope every HTTP response uses.
///
/// `code = 0` means success. Failures carry the stable [`ErrorCode`] wire
/// number, a short human message and the request ID for support lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful envelope wrapping `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    /// Failure envelope for `code` with a human message.
    pub fn error(code: ErrorCode, msg: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            code: code.wire_code(),
            msg: msg.into(),
            data: None,
            timestamp: Utc::now(),
            request_id: Some(request_id.to_string()),
        }
    }

    /// Attach the request ID to a success envelope.
    #[must_use]
    pub fn with_request_id(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope() {
        let resp = ApiResponse::ok(serde_json::json!({"x": 1}));
        assert_eq!(resp.code, 0);
        assert_eq!(resp.msg, "ok");
        assert!(resp.data.is_some());
    }

    #[test]
    fn test_error_envelope_carries_request_id() {
        let rid = RequestId::from_header("req-123");
        let resp: ApiResponse<()> = ApiResponse::error(ErrorCode::NotFound, "no such code", &rid);
        assert_eq!(resp.code, ErrorCode::NotFound.wire_code());
        assert_eq!(resp.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn test_header_sanitization() {
        assert_eq!(RequestId::from_header("abc-123").as_str(), "abc-123");
        // Control characters and oversize values are replaced, not trusted.
        assert_ne!(RequestId::from_header("a\nb").as_str(), "a\nb");
        let oversize = "x".repeat(200);
        assert_ne!(RequestId::from_header(&oversize).as_str(), oversize);
    }
}
