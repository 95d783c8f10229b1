//! Chat transport: raw provider primitives, without throttling or retries

use crate::gateway::GatewayError;
use crate::models::{ChatId, InboundEvent, InteractivePrompt, MessageHandle, Priority};
use async_trait::async_trait;

/// Provider client (e.g. Telegram). Each method is exactly one API call.
///
/// Implementations must not rate limit or retry on their own; [`GatewayClient`]
/// wraps every call with the shared limiter and retry policy.
///
/// [`GatewayClient`]: crate::gateway::GatewayClient
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Provider name for logging (e.g. "telegram").
    fn name(&self) -> &str;

    async fn send_text(&self, text: &str, priority: Priority)
        -> Result<MessageHandle, GatewayError>;

    async fn edit_text(&self, handle: &MessageHandle, text: &str) -> Result<(), GatewayError>;

    /// Send a message with one selectable entry per prompt choice.
    async fn send_prompt(&self, prompt: &InteractivePrompt) -> Result<MessageHandle, GatewayError>;

    /// Confirm a button press to the provider, optionally with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>)
        -> Result<(), GatewayError>;

    /// Mark a message as seen with an emoji reaction.
    async fn set_reaction(
        &self,
        chat: &ChatId,
        handle: &MessageHandle,
        emoji: &str,
    ) -> Result<(), GatewayError>;

    /// Long-poll for inbound events. An empty batch means the poll window elapsed.
    async fn poll_events(&self) -> Result<Vec<InboundEvent>, GatewayError>;
}
