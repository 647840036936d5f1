//! The keyed response cache.
//!
//! All writers use atomic set-if-absent: of two racing executions with the
//! same key, exactly one stores its response, and both clients read that
//! one response.

use crate::key::IdempotencyKey;
use crate::record::IdempotencyRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use shared_types::StorageError;
use tracing::debug;

/// Port for the idempotency keyspace.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Store `record` under `key` iff no live record exists there.
    ///
    /// Returns `true` when this call stored the record; `false` when a live
    /// record was already present (the caller should replay it instead).
    async fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: IdempotencyRecord,
    ) -> Result<bool, StorageError>;

    /// Fetch the live record under `key`, if any. Expired records read as
    /// absent.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Drop expired records. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// In-memory store over a concurrent map.
///
/// The production profile uses the RocksDB adapter in `cp-10-storage`; this
/// implementation backs tests and the dev profile.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    map: DashMap<String, IdempotencyRecord>,
}

impl MemoryIdempotencyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (expired entries may still be counted until
    /// the next purge).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: IdempotencyRecord,
    ) -> Result<bool, StorageError> {
        let now = Utc::now();
        match self.map.entry(key.as_str().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(record);
                    Ok(true)
                } else {
                    debug!(key = %key, "Idempotency hit, replaying stored response");
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, StorageError> {
        let now = Utc::now();
        Ok(self
            .map
            .get(key.as_str())
            .filter(|r| !r.is_expired(now))
            .map(|r| r.clone()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let before = self.map.len();
        self.map.retain(|_, record| !record.is_expired(now));
        Ok(before - self.map.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoredResponse;
    use chrono::Duration;
    use shared_types::UserId;

    fn key(n: u8) -> IdempotencyKey {
        IdempotencyKey::explicit(&UserId::from("U1"), &format!("K{n}"))
    }

    fn record(body: &[u8], stored_at: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord::new(
            StoredResponse {
                status: 200,
                body: body.to_vec(),
            },
            stored_at,
        )
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let store = MemoryIdempotencyStore::new();
        let now = Utc::now();

        assert!(store.put_if_absent(&key(1), record(b"first", now)).await.unwrap());
        assert!(!store.put_if_absent(&key(1), record(b"second", now)).await.unwrap());

        let stored = store.get(&key(1)).await.unwrap().unwrap();
        assert_eq!(stored.response.body, b"first");
    }

    #[tokio::test]
    async fn test_expired_record_reads_absent() {
        let store = MemoryIdempotencyStore::new();
        let old = Utc::now() - Duration::hours(25);
        store.put_if_absent(&key(1), record(b"old", old)).await.unwrap();

        assert!(store.get(&key(1)).await.unwrap().is_none());
        // And a new write may take the slot.
        assert!(store
            .put_if_absent(&key(1), record(b"new", Utc::now()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryIdempotencyStore::new();
        let now = Utc::now();
        store
            .put_if_absent(&key(1), record(b"live", now))
            .await
            .unwrap();
        store
            .put_if_absent(&key(2), record(b"dead", now - Duration::hours(30)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&key(1)).await.unwrap().is_some());
    }
}
