//! Logging service

use crate::models::LogLevel;
use tracing_subscriber::EnvFilter;

fn default_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "nudge=error",
        LogLevel::Warn => "nudge=warn",
        LogLevel::Info => "nudge=info",
        LogLevel::Debug => "nudge=debug",
        LogLevel::Trace => "nudge=trace",
    }
}

/// Initialize logging with the specified level. `RUST_LOG`, when set, takes precedence.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
}

/// Log an interaction event (request created, answered, batch delivered...)
pub fn log_interaction(event_type: &str, subject: &str, details: Option<&str>) {
    tracing::info!(
        event_type = event_type,
        subject = subject,
        details = details.unwrap_or(""),
        "Interaction logged"
    );
}

/// Log a system error
pub fn log_error(error: &str, context: Option<&str>) {
    tracing::error!(
        error = error,
        context = context.unwrap_or(""),
        "System error occurred"
    );
}
