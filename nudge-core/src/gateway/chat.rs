//! Chat gateway: the outbound and subscription surface used by the batcher and coordinator

use crate::gateway::{EventFilter, GatewayError, Subscription};
use crate::models::{InboundEvent, InteractivePrompt, MessageHandle, Priority};
use async_trait::async_trait;

/// Rate-limited, retrying access to the operator's chat.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a plain message. Fails only after retries are exhausted.
    async fn send(&self, text: &str, priority: Priority) -> Result<MessageHandle, GatewayError>;

    /// Replace the text of a previously sent message.
    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), GatewayError>;

    /// Send an interactive message offering the prompt's choices.
    async fn send_interactive(
        &self,
        prompt: &InteractivePrompt,
    ) -> Result<MessageHandle, GatewayError>;

    /// Acknowledge an inbound event (answer the button press, react to the text).
    /// Cosmetic: failures are logged, never returned.
    async fn acknowledge(&self, event: &InboundEvent, note: Option<&str>);

    /// Listen for inbound events matching `filter` until the subscription is dropped.
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}
