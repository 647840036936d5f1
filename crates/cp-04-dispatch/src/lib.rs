//! # Dispatch Subsystem
//!
//! Turns a bound barcode into a courier task and drives that task through
//! scans to a terminal state:
//!
//! ```text
//! BarcodeBound ──► available ──accept──► accepted ──pickup──► collected
//!                                                               │ transit
//!                                                               ▼
//!                      delivered ◄──deliver── in_transit ◄──────┘
//!                                                  │ fail (any stage)
//!                                                  ▼
//!                                               failed
//! ```
//!
//! Acceptance is an atomic compare-and-swap: of N couriers racing for an
//! available task exactly one wins, the rest get `AlreadyTaken`. Every scan
//! is validated against the task's geography and the courier's managed
//! prefix before any state moves.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;

pub use domain::entities::{
    CourierTask, NextAction, ScanActor, ScanKind, ScanRequest, TaskPriority, TaskStatus,
};
pub use domain::errors::DispatchError;
pub use domain::eta::RollingEta;
pub use domain::ranking::RankedCandidate;
pub use domain::service::{DispatchService, TimeoutSweep};
pub use ports::outbound::{BarcodeControl, Candidate, CourierDirectory, TaskStore};

/// Hours an accepted task may sit unscanned before the reminder fires.
pub const REMINDER_AFTER_HOURS: i64 = 48;

/// Hours after which an unscanned accepted task returns to the pool.
pub const REASSIGN_AFTER_HOURS: i64 = 96;

/// Reassignments beyond this count fail the task (and its barcode).
pub const MAX_TASK_ATTEMPTS: u32 = 3;

/// Completions per (prefix, action) feeding the rolling ETA estimate.
pub const ETA_WINDOW: usize = 100;

/// Minimum shared prefix length for a handoff scan.
pub const HANDOFF_SHARED_PREFIX: usize = 4;
