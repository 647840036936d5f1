//! # Scheduler Subsystem
//!
//! Runs everything the platform does later: cron-recurring jobs (future
//! letter unlocks, courier timeout sweeps, draft cleanup, scheduled AI
//! replies) and ad-hoc delayed tasks.
//!
//! ## Reliability model
//!
//! - Retries with exponential backoff and jitter (base 1 s, factor 2,
//!   cap 5 min), up to `max_attempts` (default 3).
//! - A per-task-type circuit breaker opens after repeated failures inside a
//!   short window; while open, executions fail fast and re-enqueue with the
//!   breaker's cool-down delay.
//! - Errors are classified transient (retry), permanent (dead-letter) or
//!   poison (identical error signature twice running; dead-letter).
//! - Workers hold a short renewable lease per task; a crashed worker's task
//!   returns to pending once its lease lapses.
//! - Executions of one `(type, subject)` pair are serialized; everything
//!   else runs in parallel across the worker pool.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;

pub use domain::breaker::{BreakerConfig, BreakerState, TypeCircuitBreaker};
pub use domain::engine::{EngineConfig, SchedulerEngine};
pub use domain::entities::{ErrorClass, Schedule, ScheduledTask, TaskExecutionError, TaskState};
pub use domain::errors::SchedulerError;
pub use domain::handler::{HandlerRegistry, TaskHandler};
pub use ports::outbound::{DeadLetterStore, LeaseStore, ScheduledTaskStore};
pub use ports::ai::{AiProducer, AiReply};

/// Retry backoff base delay in seconds.
pub const BACKOFF_BASE_SECS: u64 = 1;

/// Retry backoff growth factor.
pub const BACKOFF_FACTOR: u32 = 2;

/// Retry backoff ceiling in seconds (5 minutes).
pub const BACKOFF_CAP_SECS: u64 = 300;

/// Default attempt budget per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Worker lease duration in seconds.
pub const LEASE_SECS: u64 = 30;
