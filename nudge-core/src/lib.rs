//! # Nudge Core Library
//!
//! Notification and approval coordination over a chat provider: a shared
//! outbound rate limiter, message batching, and approval requests that suspend
//! the caller until the operator answers in chat.

pub mod approval;
pub mod batcher;
pub mod gateway;
pub mod models;
pub mod services;
