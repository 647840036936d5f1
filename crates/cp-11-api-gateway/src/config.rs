//! Gateway tuning.

use std::time::Duration;

/// Gateway configuration, populated by the runtime.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-request deadline. On expiry the in-flight handler is dropped and
    /// no idempotency record is written, so the client can safely retry.
    pub request_timeout: Duration,
    /// Maximum accepted request body, in bytes.
    pub body_limit_bytes: usize,
    /// Requests per second allowed per client IP.
    pub rate_limit_per_sec: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            body_limit_bytes: 256 * 1024,
            rate_limit_per_sec: 50,
        }
    }
}
