//! # Courier Hierarchy Subsystem
//!
//! Models the four courier tiers and who may create, approve and promote
//! whom:
//!
//! ```text
//! L4 (school,  prefix AA)      creates/approves L3
//!   L3 (areas, prefix AABB)    creates/approves L2
//!     L2 (area, prefix AABB)   creates/approves L1
//!       L1 (point, AABBCC)     delivers
//! ```
//!
//! A courier's managed prefix is always contained in its parent's, and the
//! same prefix is never claimed twice at one level; the longest matching
//! claim wins everywhere else. Couriers are soft-status records and are
//! never deleted.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;

pub use domain::entities::{
    ApprovalKind, ApprovalRecord, Courier, CourierStatus, PerformanceCounters,
};
pub use domain::errors::CourierError;
pub use domain::score::{DefaultScore, PerformanceScore};
pub use domain::service::{CourierConfig, CourierService, Reviewer};
pub use ports::outbound::CourierStore;
