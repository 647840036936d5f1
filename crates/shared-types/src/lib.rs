//! # Shared Types Crate
//!
//! Cross-subsystem identities, roles and wire-level types for the CampusPost
//! platform.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: types that cross a subsystem boundary are
//!   defined here, never duplicated per crate.
//! - **IDs over references**: aggregates refer to each other by ID; cross
//!   lookups go through the owning subsystem's interface (couriers and tasks
//!   are deliberately not linked by pointers).
//! - **Stable wire codes**: every user-visible failure maps to one
//!   [`ErrorCode`]; subsystem error enums convert here, in one place.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use entities::*;
pub use envelope::{ApiResponse, RequestId};
pub use errors::{ErrorCode, StorageError};
pub use ids::*;
