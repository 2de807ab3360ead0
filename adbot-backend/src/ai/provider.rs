use super::streaming::StreamReceiver;
use super::types::AiError;
use crate::models::ChatMessage;
use async_trait::async_trait;

/// A generative-language backend that streams a reply.
///
/// Implementations open the upstream request, return once the provider has
/// accepted it, and keep pushing events into the returned receiver from a
/// background task.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    async fn stream_reply(
        &self,
        system_prompt: &str,
        prior_turns: &[ChatMessage],
        current_message: &str,
    ) -> Result<StreamReceiver, AiError>;
}
