//! Approval requests: ask the operator a question in chat and wait for the answer

mod coordinator;
mod error;

pub use coordinator::{ApprovalCoordinator, ApprovalSettings, FREE_TEXT_PROMPT};
pub use error::ApprovalError;
