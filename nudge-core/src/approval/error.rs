//! Approval error types

use crate::gateway::GatewayError;
use thiserror::Error;

/// Failure of an approval operation. A timeout is not an error; see
/// [`ApprovalOutcome::TimedOut`](crate::models::ApprovalOutcome::TimedOut).
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("failed to send approval request: {0}")]
    GatewaySend(#[from] GatewayError),

    #[error("approval request not found: {0}")]
    NotFound(String),

    #[error("approval request {0} is already being awaited")]
    AlreadyAwaited(String),
}
