//! Outbound rate limiting: a sustained per-minute cap layered with a short burst cap
//!
//! Both windows are sliding logs of admission timestamps, pruned lazily on every
//! [`RateLimiter::throttle`] call. A caller that would exceed either cap sleeps until
//! the oldest timestamp of the offending window expires (plus a small safety margin)
//! and then re-checks both windows.

use crate::models::{ConfigurationError, RateLimitConfig};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

pub const DEFAULT_MAX_PER_MINUTE: u32 = 20;
pub const DEFAULT_BURST_SIZE: u32 = 5;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const BURST_WINDOW: Duration = Duration::from_secs(1);
const SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// Admission timestamps for both windows.
#[derive(Debug, Default)]
struct RateWindow {
    calls: VecDeque<Instant>,
    burst_calls: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        prune_older_than(&mut self.calls, now, MINUTE_WINDOW);
        prune_older_than(&mut self.burst_calls, now, BURST_WINDOW);
    }

    /// How long the next caller must wait, or `None` if it may go now.
    fn required_delay(&self, now: Instant, max_per_minute: usize, burst_size: usize) -> Option<Duration> {
        if self.burst_calls.len() >= burst_size {
            let oldest = *self.burst_calls.front()?;
            return Some(BURST_WINDOW.saturating_sub(now.duration_since(oldest)) + SAFETY_MARGIN);
        }
        if self.calls.len() >= max_per_minute {
            let oldest = *self.calls.front()?;
            return Some(MINUTE_WINDOW.saturating_sub(now.duration_since(oldest)) + SAFETY_MARGIN);
        }
        None
    }

    fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
        self.burst_calls.push_back(now);
    }
}

fn prune_older_than(window: &mut VecDeque<Instant>, now: Instant, retention: Duration) {
    while let Some(&oldest) = window.front() {
        if now.duration_since(oldest) >= retention {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Shared limiter for every outbound call to the chat provider.
///
/// Waiting callers hold the window lock while they sleep, so admission is FIFO:
/// tokio's mutex queues waiters in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_minute: u32,
    burst_size: u32,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter. Zero limits would block forever and are rejected.
    pub fn new(max_per_minute: u32, burst_size: u32) -> Result<Self, ConfigurationError> {
        let mut errors = Vec::new();
        if max_per_minute == 0 {
            errors.push("max_per_minute must be positive".to_string());
        }
        if burst_size == 0 {
            errors.push("burst_size must be positive".to_string());
        }
        if !errors.is_empty() {
            return Err(ConfigurationError::Invalid(errors));
        }
        Ok(Self {
            max_per_minute,
            burst_size,
            window: Mutex::new(RateWindow::default()),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigurationError> {
        Self::new(config.max_per_minute, config.burst_size)
    }

    /// Wait until one more outbound call fits both windows, then record it.
    ///
    /// The timestamp is taken at the moment of admission, not when the caller
    /// started waiting.
    pub async fn throttle(&self) {
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            window.prune(now);
            match window.required_delay(now, self.max_per_minute as usize, self.burst_size as usize) {
                Some(delay) => {
                    tracing::debug!(
                        delay_ms = delay.as_millis() as u64,
                        "outbound call throttled"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    window.record(now);
                    return;
                }
            }
        }
    }

    /// Calls still available right now as `(per_minute, burst)`.
    pub async fn remaining(&self) -> (u32, u32) {
        let mut window = self.window.lock().await;
        window.prune(Instant::now());
        (
            self.max_per_minute.saturating_sub(window.calls.len() as u32),
            self.burst_size.saturating_sub(window.burst_calls.len() as u32),
        )
    }

    /// Configured `(max_per_minute, burst_size)`.
    pub fn limits(&self) -> (u32, u32) {
        (self.max_per_minute, self.burst_size)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            max_per_minute: DEFAULT_MAX_PER_MINUTE,
            burst_size: DEFAULT_BURST_SIZE,
            window: Mutex::new(RateWindow::default()),
        }
    }
}
