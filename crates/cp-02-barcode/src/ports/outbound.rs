//! Outbound ports implemented by the persistence layer.
//!
//! The barcode service is the binding owner, so the letter and envelope
//! stores it needs during `bind` are declared here; adapters live in
//! `cp-10-storage` and are wired by the runtime.

use crate::domain::entities::Barcode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{BarcodeCode, Envelope, EnvelopeId, Letter, LetterId, StorageError};

/// Persistence for barcode aggregates.
#[async_trait]
pub trait BarcodeStore: Send + Sync {
    /// Insert `barcode` iff its code is unused. Returns `false` when the
    /// code was already taken (caller redraws).
    async fn reserve(&self, barcode: Barcode) -> Result<bool, StorageError>;

    /// Fetch a barcode by code.
    async fn get(&self, code: &BarcodeCode) -> Result<Option<Barcode>, StorageError>;

    /// Overwrite an existing barcode. Errors with `NotFound` if the code
    /// was never reserved.
    async fn put(&self, barcode: &Barcode) -> Result<(), StorageError>;

    /// Bound barcodes whose `reveal_at` has passed.
    async fn list_reveal_due(&self, now: DateTime<Utc>) -> Result<Vec<Barcode>, StorageError>;
}

/// Read/write access to letters, scoped to what binding needs.
#[async_trait]
pub trait LetterStore: Send + Sync {
    async fn get(&self, id: &LetterId) -> Result<Option<Letter>, StorageError>;

    async fn put(&self, letter: &Letter) -> Result<(), StorageError>;

    /// Draft letters created before `cutoff` (stale-draft cleanup).
    async fn list_drafts_before(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<Letter>, StorageError>;
}

/// Read/write access to envelopes, scoped to what binding needs.
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    async fn get(&self, id: &EnvelopeId) -> Result<Option<Envelope>, StorageError>;

    async fn put(&self, envelope: &Envelope) -> Result<(), StorageError>;
}
