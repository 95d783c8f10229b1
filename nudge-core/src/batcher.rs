//! Message batching
//!
//! Normal and low priority notifications accumulate for one batching window and
//! go out as a single chat message. A high priority notification flushes the
//! queue immediately, together with whatever was already waiting. A multi-message
//! batch is delivered as a short "compacting" placeholder that is then edited in
//! place to the combined text.
//!
//! Queue snapshots are handed to a single delivery worker, so batches reach the
//! chat in the order they were cut even when several flushes overlap.

use crate::gateway::ChatGateway;
use crate::models::{BatchingConfig, ConfigurationError, MessageHandle, PendingMessage, Priority};
use crate::services::logging::{log_error, log_interaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Visible delimiter between combined notifications.
pub const BATCH_SEPARATOR: &str = "\n\n───\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherSettings {
    /// How long the first queued notification waits for company
    pub window: Duration,
    /// Queue length above which the batch is flushed without waiting
    pub max_queue_size: usize,
    /// Queued entries older than `stale_multiplier * window` are dropped
    pub stale_multiplier: u32,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self::from_config(&BatchingConfig::default())
    }
}

impl BatcherSettings {
    pub fn from_config(config: &BatchingConfig) -> Self {
        Self {
            window: config.window(),
            max_queue_size: config.max_queue_size,
            stale_multiplier: config.stale_multiplier,
        }
    }

    fn stale_after(&self) -> Duration {
        self.window.saturating_mul(self.stale_multiplier)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();
        if self.window.is_zero() {
            errors.push("batching window must be positive".to_string());
        }
        if self.max_queue_size == 0 {
            errors.push("batching max_queue_size must be positive".to_string());
        }
        if self.stale_multiplier == 0 {
            errors.push("batching stale_multiplier must be positive".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(errors))
        }
    }
}

/// Result of delivering one batch.
///
/// `combined` is always populated, even when delivery failed, so the caller can
/// fall back to another channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    pub combined: String,
    pub message_count: usize,
    /// Chat message holding the batch, if one was sent
    pub handle: Option<MessageHandle>,
    pub delivered: bool,
}

struct FlushJob {
    batch: Vec<PendingMessage>,
    done: oneshot::Sender<FlushOutcome>,
}

struct BatchState {
    queue: Vec<PendingMessage>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the armed timer is cancelled, so a timer that already
    /// woke up can tell it is obsolete.
    generation: u64,
    /// `None` once the batcher is shut down.
    jobs: Option<mpsc::UnboundedSender<FlushJob>>,
}

impl BatchState {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Cancel the timer and hand the whole queue to the delivery worker.
    fn submit(&mut self) -> Option<oneshot::Receiver<FlushOutcome>> {
        self.cancel_timer();
        if self.queue.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.queue);
        let Some(jobs) = self.jobs.as_ref() else {
            tracing::warn!(
                dropped = batch.len(),
                "batcher is shut down; discarding queued notifications"
            );
            return None;
        };
        let (done, outcome) = oneshot::channel();
        if jobs.send(FlushJob { batch, done }).is_err() {
            tracing::error!("delivery worker is gone; batch lost");
            return None;
        }
        Some(outcome)
    }
}

struct Inner {
    settings: BatcherSettings,
    state: Mutex<BatchState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Accumulates notifications and emits them as combined chat messages.
///
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct MessageBatcher {
    inner: Arc<Inner>,
}

impl MessageBatcher {
    /// Create a batcher and start its delivery worker. Must be called inside a tokio runtime.
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        settings: BatcherSettings,
    ) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(delivery_worker(gateway, rx));
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(BatchState {
                    queue: Vec::new(),
                    timer: None,
                    generation: 0,
                    jobs: Some(jobs),
                }),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn settings(&self) -> &BatcherSettings {
        &self.inner.settings
    }

    /// Queue a notification.
    ///
    /// Returns the flush outcome when this call caused a flush (high priority,
    /// or the queue outgrew `max_queue_size`), otherwise `None`. After
    /// [`shutdown`](Self::shutdown) the notification is discarded.
    pub async fn add(&self, text: impl Into<String>, priority: Priority) -> Option<FlushOutcome> {
        let message = PendingMessage::new(text, priority);
        let pending = {
            let mut state = self.inner.state.lock().await;
            if state.jobs.is_none() {
                tracing::warn!(priority = %priority, "batcher is shut down; notification discarded");
                return None;
            }

            let stale_after = self.inner.settings.stale_after();
            let dropped = drop_stale(&mut state.queue, message.enqueued_at, stale_after);
            if dropped > 0 {
                tracing::warn!(
                    dropped = dropped,
                    max_age_secs = stale_after.as_secs(),
                    "dropped stale queued notifications"
                );
            }

            state.queue.push(message);
            let queued = state.queue.len();
            if priority == Priority::High || queued > self.inner.settings.max_queue_size {
                tracing::debug!(queued = queued, priority = %priority, "flushing batch early");
                state.submit()
            } else {
                if state.timer.is_none() {
                    self.arm_timer(&mut state);
                }
                None
            }
        };
        await_outcome(pending).await
    }

    /// Deliver everything queued now. `None` (and no chat traffic) when the queue is empty.
    pub async fn flush(&self) -> Option<FlushOutcome> {
        let pending = self.inner.state.lock().await.submit();
        await_outcome(pending).await
    }

    /// Flush the remainder, stop accepting notifications and wait until every
    /// batch already handed to the worker has been delivered.
    pub async fn shutdown(&self) -> Option<FlushOutcome> {
        let pending = {
            let mut state = self.inner.state.lock().await;
            let pending = state.submit();
            state.jobs = None;
            pending
        };
        let outcome = await_outcome(pending).await;

        let worker = self.inner.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "delivery worker terminated abnormally");
            }
            tracing::info!("message batcher stopped");
        }
        outcome
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn has_timer(&self) -> bool {
        self.inner.state.lock().await.timer.is_some()
    }

    fn arm_timer(&self, state: &mut BatchState) {
        let generation = state.generation;
        let window = self.inner.settings.window;
        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut state = inner.state.lock().await;
            if state.generation != generation {
                return;
            }
            // Detach before submitting so submit() does not abort this task.
            state.timer = None;
            tracing::debug!(queued = state.queue.len(), "batch window elapsed");
            let _ = state.submit();
        }));
    }
}

async fn await_outcome(pending: Option<oneshot::Receiver<FlushOutcome>>) -> Option<FlushOutcome> {
    pending?.await.ok()
}

async fn delivery_worker(gateway: Arc<dyn ChatGateway>, mut jobs: mpsc::UnboundedReceiver<FlushJob>) {
    while let Some(job) = jobs.recv().await {
        let outcome = deliver_batch(gateway.as_ref(), job.batch).await;
        // The requester may have stopped waiting (timer flushes never wait).
        let _ = job.done.send(outcome);
    }
    tracing::debug!("delivery worker drained");
}

async fn deliver_batch(gateway: &dyn ChatGateway, batch: Vec<PendingMessage>) -> FlushOutcome {
    let message_count = batch.len();
    let combined = combine_messages(&batch);
    let priority = batch
        .iter()
        .map(|message| message.priority)
        .max()
        .unwrap_or_default();

    if message_count == 1 {
        return match gateway.send(&combined, priority).await {
            Ok(handle) => {
                log_interaction("notification_sent", handle.as_str(), None);
                FlushOutcome {
                    combined,
                    message_count,
                    handle: Some(handle),
                    delivered: true,
                }
            }
            Err(err) => {
                log_error(&err.to_string(), Some("sending notification"));
                FlushOutcome {
                    combined,
                    message_count,
                    handle: None,
                    delivered: false,
                }
            }
        };
    }

    let placeholder = format!("📦 Compacting {} messages…", message_count);
    let handle = match gateway.send(&placeholder, priority).await {
        Ok(handle) => handle,
        Err(err) => {
            log_error(&err.to_string(), Some("sending batch placeholder"));
            return FlushOutcome {
                combined,
                message_count,
                handle: None,
                delivered: false,
            };
        }
    };

    let delivered = match gateway.edit(&handle, &combined).await {
        Ok(()) => {
            let details = format!("{} messages", message_count);
            log_interaction("batch_delivered", handle.as_str(), Some(details.as_str()));
            true
        }
        Err(err) => {
            log_error(&err.to_string(), Some("editing batch placeholder"));
            false
        }
    };
    FlushOutcome {
        combined,
        message_count,
        handle: Some(handle),
        delivered,
    }
}

/// Join queued texts in insertion order.
pub fn combine_messages(batch: &[PendingMessage]) -> String {
    batch
        .iter()
        .map(|message| message.text.as_str())
        .collect::<Vec<_>>()
        .join(BATCH_SEPARATOR)
}

/// Remove entries queued longer than `max_age` ago. Returns how many were removed.
fn drop_stale(queue: &mut Vec<PendingMessage>, now: Instant, max_age: Duration) -> usize {
    let before = queue.len();
    queue.retain(|message| now.saturating_duration_since(message.enqueued_at) <= max_age);
    before - queue.len()
}
