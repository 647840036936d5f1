//! Stored responses.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A serialized response, replayed verbatim on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes, exactly as first sent.
    pub body: Vec<u8>,
}

/// One idempotency cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub response: StoredResponse,
    pub stored_at: DateTime<Utc>,
    /// TTL in hours; entries beyond it are treated as absent.
    pub ttl_hours: i64,
}

impl IdempotencyRecord {
    /// Create a record with the standard TTL.
    #[must_use]
    pub fn new(response: StoredResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            response,
            stored_at,
            ttl_hours: crate::RECORD_TTL_HOURS,
        }
    }

    /// True once the record's TTL has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at >= Duration::hours(self.ttl_hours)
    }
}
