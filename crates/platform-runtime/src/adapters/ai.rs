//! The AI producer collaborator.
//!
//! Text generation is an out-of-core service; the platform only ever calls
//! [`AiProducer::generate`]. The default wiring uses a local template
//! producer so the scheduled-reply pipeline works end to end without a
//! provider; deployments swap in a real client behind the same port.

use async_trait::async_trait;
use cp_07_scheduler::{AiProducer, AiReply};

/// Deterministic local producer.
pub struct TemplateAiProducer;

#[async_trait]
impl AiProducer for TemplateAiProducer {
    async fn generate(
        &self,
        prompt: &str,
        persona: &str,
        _context: &str,
    ) -> Result<AiReply, String> {
        let text = format!("[{persona}] {prompt}");
        Ok(AiReply {
            tokens: text.split_whitespace().count() as u32,
            text,
            provider: "template".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_template_producer_replies() {
        let reply = TemplateAiProducer
            .generate("write back warmly", "penpal", "")
            .await
            .unwrap();
        assert!(reply.text.contains("penpal"));
        assert_eq!(reply.provider, "template");
        assert!(reply.tokens > 0);
    }
}
