//! # Real-Time Hub
//!
//! Live fan-out of platform events to connected clients.
//!
//! ## Scheduling model
//!
//! One central dispatcher task owns every connection and room; all
//! mutations arrive as commands over a bounded queue. Per-connection
//! delivery goes through that connection's bounded send buffer, so fan-out
//! is parallel across connections but serialized per connection:
//!
//! ```text
//!  reader ──► commands ──► ┌────────────┐ ──► send buffer ──► writer
//!  reader ──► commands ──► │ dispatcher │ ──► send buffer ──► writer
//!                          │ (owns all  │
//!  bus events ───────────► │ conns/rooms)│
//!                          └────────────┘
//! ```
//!
//! Nothing outside the dispatcher ever touches a `Connection`.
//!
//! ## Flow control
//!
//! A connection whose send buffer is full is closed with `SlowConsumer`;
//! other members of its rooms are unaffected and their per-room sequence
//! numbers stay gapless. Inbound frames over 64 KiB close the connection
//! with `MessageTooLarge`.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod history;
pub mod hub;
pub mod protocol;

pub use hub::{ConnectionId, Hub, HubConfig, HubHandle, HubStats, RegisterRequest};
pub use protocol::{ClientCommand, CloseReason, EventType, WsFrame};

/// Maximum inbound frame size in bytes (64 KiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Bounded per-connection send buffer, in frames.
pub const SEND_BUFFER_FRAMES: usize = 256;

/// Events retained per room for replay.
pub const HISTORY_CAPACITY: usize = 1000;

/// Ping cadence in seconds.
pub const PING_INTERVAL_SECS: u64 = 54;

/// Idle window without a pong before the connection is closed, in seconds.
pub const PONG_TIMEOUT_SECS: u64 = 60;

/// How long an empty room lingers before garbage collection, in seconds.
pub const ROOM_GC_SECS: u64 = 5 * 60;

/// Drain window for a closing connection's buffered frames, in seconds.
pub const CLOSE_DRAIN_SECS: u64 = 2;
