//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Typed in-process pub/sub connecting the barcode lifecycle, dispatch
//! engine, real-time hub and scheduler.
//!
//! ## Choreography
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  cp-02       │                    │  cp-04       │
//! │  barcode     │    publish()       │  dispatch    │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  │              │  subscribe()
//!                  └──────────────┘
//!                        │
//!                        ├──► cp-06 realtime (room fan-out)
//!                        └──► cp-07 scheduler (follow-ups)
//! ```
//!
//! Delivery is fire-and-forget within the process, over bounded buffers;
//! subscribers that need at-least-once semantics enqueue durable work on the
//! scheduler instead of relying on the bus. Subscribers are registered at
//! startup by the runtime.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, EventTopic, PlatformEvent, PublishedEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription};

/// Maximum events buffered per subscriber before lagging sets in.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
