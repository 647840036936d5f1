//! # Idempotency Subsystem
//!
//! Collapses client retries of mutating requests into one execution.
//!
//! The key is a SHA-256 digest of `user | method | path | query | body`
//! (body capped at 10 KiB), unless the client supplies an explicit
//! `Idempotency-Key` header, which wins. The first execution stores the
//! serialized response before returning; a retry with the same key within
//! the 24-hour TTL replays that response byte-for-byte.
//!
//! Records are written with set-if-absent semantics, and are deliberately
//! NOT written when a request's deadline was exceeded, so the client can
//! safely retry a timed-out call.

pub mod key;
pub mod record;
pub mod store;

pub use key::IdempotencyKey;
pub use record::{IdempotencyRecord, StoredResponse};
pub use store::{IdempotencyStore, MemoryIdempotencyStore};

/// How long a stored response stays replayable.
pub const RECORD_TTL_HOURS: i64 = 24;

/// Body bytes beyond this cap do not feed the derived key.
pub const KEY_BODY_CAP: usize = 10 * 1024;
