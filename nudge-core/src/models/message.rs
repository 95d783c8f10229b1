//! Message data structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Priority levels for notifications
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Priority {
    #[serde(rename = "low")]
    Low,
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "high")]
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" | "urgent" => Ok(Priority::High),
            other => Err(format!(
                "unknown priority '{}' (expected low, normal or high)",
                other
            )),
        }
    }
}

/// Provider-assigned handle of a message the gateway has sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for MessageHandle {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat (conversation) an inbound event originates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A notification waiting in the batch queue.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub text: String,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

impl PendingMessage {
    pub fn new(text: impl Into<String>, priority: Priority) -> Self {
        Self {
            text: text.into(),
            priority,
            enqueued_at: Instant::now(),
        }
    }
}

/// Event received from the chat provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The operator pressed a button on an interactive message.
    Callback {
        callback_id: String,
        chat: ChatId,
        message: MessageHandle,
        data: String,
    },
    /// The operator posted a plain text message.
    Text {
        chat: ChatId,
        message: MessageHandle,
        text: String,
        reply_to: Option<MessageHandle>,
    },
}

impl InboundEvent {
    pub fn chat(&self) -> &ChatId {
        match self {
            InboundEvent::Callback { chat, .. } | InboundEvent::Text { chat, .. } => chat,
        }
    }

    pub fn message(&self) -> &MessageHandle {
        match self {
            InboundEvent::Callback { message, .. } | InboundEvent::Text { message, .. } => message,
        }
    }
}
