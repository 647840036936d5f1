//! # API Gateway
//!
//! The platform's external surface: a versioned REST API under `/api/v1`
//! and the WebSocket upgrade for the real-time hub.
//!
//! ## Request pipeline
//!
//! ```text
//! request ──► request-id ──► rate limit ──► body limit ──► auth ──►
//!        idempotency (mutations) ──► handler ──► envelope + X-Request-ID
//! ```
//!
//! Every response wears the `{code, msg, data, timestamp}` envelope and
//! echoes `X-Request-ID`. Mutating requests pass through the idempotency
//! cache; retries inside the TTL replay the first response byte-for-byte.
//! Transient downstream failures are retried twice with jitter before
//! surfacing `Unavailable`.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod retry;
pub mod router;
pub mod state;
pub mod ws;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;

/// Automatic retries for transient downstream failures, per request.
pub const TRANSIENT_RETRIES: u32 = 2;
