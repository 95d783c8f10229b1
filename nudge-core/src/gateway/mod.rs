//! Chat gateway
//!
//! Everything that talks to the chat provider goes through here: the shared
//! [`RateLimiter`], the [`RetryPolicy`] for transient failures, and the
//! [`EventDispatcher`] that routes inbound button presses and text replies to
//! whoever subscribed for them. [`GatewayClient`] puts these together over a
//! raw [`ChatTransport`] such as [`TelegramTransport`].

mod chat;
mod client;
mod dispatch;
mod error;
mod rate_limiter;
mod retry;
mod telegram;
mod transport;

pub use chat::ChatGateway;
pub use client::GatewayClient;
pub use dispatch::{EventDispatcher, EventFilter, Subscription};
pub use error::GatewayError;
pub use rate_limiter::{RateLimiter, DEFAULT_BURST_SIZE, DEFAULT_MAX_PER_MINUTE};
pub use retry::RetryPolicy;
pub use telegram::TelegramTransport;
pub use transport::ChatTransport;
