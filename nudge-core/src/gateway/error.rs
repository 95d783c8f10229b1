//! Gateway error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Failure of a call against the chat provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection-level failure (DNS, TLS, reset, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status
    #[error("provider API error {status}: {description}")]
    Api { status: u16, description: String },

    /// The provider asked us to slow down
    #[error("rate limited by provider; retry after {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// The request could not be built from the given input
    #[error("request rejected: {0}")]
    Rejected(String),

    /// A transient failure persisted through every retry attempt
    #[error("gateway call failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::RateLimited { .. } => true,
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Rejected(_) | GatewayError::RetriesExhausted { .. } => false,
        }
    }

    /// Provider-mandated delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => GatewayError::Api {
                status: status.as_u16(),
                description: err.to_string(),
            },
            None => GatewayError::Transport(err.to_string()),
        }
    }
}
