//! Gateway client: rate limiting, retries and event polling on top of a chat transport

use crate::gateway::{
    ChatGateway, ChatTransport, EventDispatcher, EventFilter, GatewayError, RateLimiter,
    RetryPolicy, Subscription,
};
use crate::models::{
    Configuration, ConfigurationError, InboundEvent, InteractivePrompt, MessageHandle, Priority,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Reaction marking a free-text answer as received.
const RECEIVED_REACTION: &str = "👀";

/// Lower bound between failed polls so a broken provider does not spin the loop.
const MIN_POLL_BACKOFF: Duration = Duration::from_millis(100);

struct Poller {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// [`ChatGateway`] implementation over any [`ChatTransport`].
///
/// Every outbound call waits on the shared [`RateLimiter`] and is retried per
/// [`RetryPolicy`]; each retry attempt consumes rate budget like any other call.
/// Inbound events from [`start_polling`](Self::start_polling) are fanned out
/// through the [`EventDispatcher`].
pub struct GatewayClient<T: ChatTransport> {
    transport: Arc<T>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    dispatcher: EventDispatcher,
    poller: Mutex<Option<Poller>>,
}

impl<T: ChatTransport + 'static> GatewayClient<T> {
    pub fn new(transport: Arc<T>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            retry,
            dispatcher: EventDispatcher::new(),
            poller: Mutex::new(None),
        }
    }

    /// Build with the configured rate limits and retry schedule.
    pub fn from_config(transport: Arc<T>, config: &Configuration) -> Result<Self, ConfigurationError> {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit)?);
        Ok(Self::new(
            transport,
            limiter,
            RetryPolicy::from_config(&config.retry),
        ))
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Dispatcher fed by the poll loop. Events may also be injected directly.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Start the long-poll loop. No-op if it is already running.
    pub async fn start_polling(&self) {
        let mut slot = self.poller.lock().await;
        if slot.is_some() {
            tracing::debug!(provider = self.transport.name(), "event polling already running");
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.transport),
            self.dispatcher.clone(),
            self.retry,
            stop_rx,
        ));
        *slot = Some(Poller { stop, task });
        tracing::info!(provider = self.transport.name(), "event polling started");
    }

    /// Stop the poll loop and wait for it to exit. An in-flight poll is abandoned.
    pub async fn stop_polling(&self) {
        let poller = self.poller.lock().await.take();
        if let Some(poller) = poller {
            let _ = poller.stop.send(true);
            if let Err(err) = poller.task.await {
                tracing::error!(error = %err, "event poller terminated abnormally");
            }
            tracing::info!(provider = self.transport.name(), "event polling stopped");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_some()
    }
}

async fn poll_loop<T: ChatTransport>(
    transport: Arc<T>,
    dispatcher: EventDispatcher,
    retry: RetryPolicy,
    mut stop: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;
    loop {
        let polled = tokio::select! {
            _ = stop.changed() => break,
            result = transport.poll_events() => result,
        };
        match polled {
            Ok(events) => {
                failures = 0;
                for event in events {
                    dispatcher.dispatch(event);
                }
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| retry.delay_for(failures))
                    .max(MIN_POLL_BACKOFF);
                tracing::warn!(
                    provider = transport.name(),
                    consecutive_failures = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "event poll failed"
                );
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[async_trait]
impl<T: ChatTransport + 'static> ChatGateway for GatewayClient<T> {
    async fn send(&self, text: &str, priority: Priority) -> Result<MessageHandle, GatewayError> {
        let limiter = &self.limiter;
        let transport = &self.transport;
        self.retry
            .run("send", move |_| async move {
                limiter.throttle().await;
                transport.send_text(text, priority).await
            })
            .await
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), GatewayError> {
        let limiter = &self.limiter;
        let transport = &self.transport;
        self.retry
            .run("edit", move |_| async move {
                limiter.throttle().await;
                transport.edit_text(handle, text).await
            })
            .await
    }

    async fn send_interactive(
        &self,
        prompt: &InteractivePrompt,
    ) -> Result<MessageHandle, GatewayError> {
        let limiter = &self.limiter;
        let transport = &self.transport;
        self.retry
            .run("send_interactive", move |_| async move {
                limiter.throttle().await;
                transport.send_prompt(prompt).await
            })
            .await
    }

    async fn acknowledge(&self, event: &InboundEvent, note: Option<&str>) {
        self.limiter.throttle().await;
        let result = match event {
            InboundEvent::Callback { callback_id, .. } => {
                self.transport.answer_callback(callback_id, note).await
            }
            InboundEvent::Text { chat, message, .. } => {
                self.transport
                    .set_reaction(chat, message, RECEIVED_REACTION)
                    .await
            }
        };
        if let Err(err) = result {
            tracing::warn!(
                provider = self.transport.name(),
                message = %event.message(),
                error = %err,
                "acknowledgement failed; ignoring"
            );
        }
    }

    fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.dispatcher.subscribe(filter)
    }
}
