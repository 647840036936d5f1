//! # Persistence Adapters
//!
//! Implements every subsystem's outbound storage port twice:
//!
//! - [`memory::MemoryStore`]: concurrent maps; the dev/test profile.
//! - `rocks::RocksStore`: RocksDB column families; the production
//!   profile (behind the `rocksdb` feature).
//!
//! Domain crates only ever see their own port traits; which adapter backs
//! them is a runtime wiring decision. Both adapters honor the same
//! contracts: reserve/insert are set-if-absent, task acceptance is a
//! compare-and-swap, and list operations are consistent snapshots.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod memory;

#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::MemoryStore;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
