//! The out-of-core AI text producer.
//!
//! The platform treats text generation as a black box behind one call.
//! Failures are transient by definition here; the engine's retry and
//! circuit-breaker policy absorbs provider outages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A produced reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiReply {
    pub text: String,
    pub tokens: u32,
    /// Which provider actually served the call.
    pub provider: String,
}

/// The single entry point to the AI collaborator.
#[async_trait]
pub trait AiProducer: Send + Sync {
    /// Generate a reply. The error string is a provider diagnostic; callers
    /// treat every failure as transient.
    async fn generate(
        &self,
        prompt: &str,
        persona: &str,
        context: &str,
    ) -> Result<AiReply, String>;
}
