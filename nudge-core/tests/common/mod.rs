//! Shared fixtures for integration tests: a scriptable in-memory chat transport

#![allow(dead_code)]

use async_trait::async_trait;
use nudge_core::gateway::{
    ChatTransport, EventDispatcher, GatewayClient, GatewayError, RateLimiter, RetryPolicy,
};
use nudge_core::models::{ChatId, InboundEvent, InteractivePrompt, MessageHandle, Priority};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Chat the mock transport lives in.
pub const CHAT: i64 = 555;

/// First message handle the mock hands out.
pub const FIRST_HANDLE: i64 = 42;

/// A successful outbound call as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send {
        text: String,
        priority: Priority,
    },
    Edit {
        handle: MessageHandle,
        text: String,
    },
    Prompt {
        question: String,
        tokens: Vec<String>,
    },
    AnswerCallback {
        callback_id: String,
        text: Option<String>,
    },
    Reaction {
        handle: MessageHandle,
        emoji: String,
    },
}

/// In-memory [`ChatTransport`]. Scripted failures are consumed per operation
/// ("send", "edit", "prompt") before the call would succeed.
pub struct MockTransport {
    calls: Mutex<Vec<(Call, Instant)>>,
    next_handle: AtomicI64,
    attempts: AtomicU32,
    failures: Mutex<HashMap<&'static str, VecDeque<GatewayError>>>,
    fail_acks: AtomicBool,
    events: Mutex<VecDeque<Result<Vec<InboundEvent>, GatewayError>>>,
    polls: AtomicU32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_handle: AtomicI64::new(FIRST_HANDLE),
            attempts: AtomicU32::new(0),
            failures: Mutex::new(HashMap::new()),
            fail_acks: AtomicBool::new(false),
            events: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
        }
    }

    /// Make the next `op` call fail with `err`. Queued failures are used in order.
    pub fn fail_next(&self, op: &'static str, err: GatewayError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn fail_acknowledgements(&self, fail: bool) {
        self.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Queue a batch of events for the next poll.
    pub fn push_events(&self, events: Vec<InboundEvent>) {
        self.events.lock().unwrap().push_back(Ok(events));
    }

    /// Make the next poll fail.
    pub fn push_poll_error(&self, err: GatewayError) {
        self.events.lock().unwrap().push_back(Err(err));
    }

    /// Successful calls in the order the provider received them.
    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Every send/edit/prompt attempt, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    fn outbound(&self, op: &'static str) -> Result<(), GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn new_handle(&self) -> MessageHandle {
        MessageHandle::from(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_text(
        &self,
        text: &str,
        priority: Priority,
    ) -> Result<MessageHandle, GatewayError> {
        self.outbound("send")?;
        self.record(Call::Send {
            text: text.to_string(),
            priority,
        });
        Ok(self.new_handle())
    }

    async fn edit_text(&self, handle: &MessageHandle, text: &str) -> Result<(), GatewayError> {
        self.outbound("edit")?;
        self.record(Call::Edit {
            handle: handle.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_prompt(&self, prompt: &InteractivePrompt) -> Result<MessageHandle, GatewayError> {
        self.outbound("prompt")?;
        self.record(Call::Prompt {
            question: prompt.question.clone(),
            tokens: prompt.choices.iter().map(|c| c.token.clone()).collect(),
        });
        Ok(self.new_handle())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), GatewayError> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 400,
                description: "query is too old".into(),
            });
        }
        self.record(Call::AnswerCallback {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn set_reaction(
        &self,
        _chat: &ChatId,
        handle: &MessageHandle,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("reset".into()));
        }
        self.record(Call::Reaction {
            handle: handle.clone(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn poll_events(&self) -> Result<Vec<InboundEvent>, GatewayError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.events.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Retry schedule with short delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
    }
}

/// Gateway client whose limiter never gets in the way.
pub fn unthrottled_client(transport: Arc<MockTransport>) -> Arc<GatewayClient<MockTransport>> {
    let limiter = Arc::new(RateLimiter::new(1000, 1000).unwrap());
    Arc::new(GatewayClient::new(transport, limiter, fast_retry()))
}

/// Yield until `count` listeners are registered.
pub async fn wait_for_listeners(dispatcher: &EventDispatcher, count: usize) {
    while dispatcher.listener_count() < count {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Yield until the transport has seen a call matching `predicate`.
pub async fn wait_for_call(transport: &MockTransport, predicate: impl Fn(&Call) -> bool) {
    while !transport.calls().iter().any(&predicate) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn button_press(message: i64, data: &str) -> InboundEvent {
    InboundEvent::Callback {
        callback_id: format!("cb-{}-{}", message, data),
        chat: ChatId::from(CHAT),
        message: MessageHandle::from(message),
        data: data.to_string(),
    }
}

pub fn text_message(message: i64, text: &str, reply_to: Option<i64>) -> InboundEvent {
    InboundEvent::Text {
        chat: ChatId::from(CHAT),
        message: MessageHandle::from(message),
        text: text.to_string(),
        reply_to: reply_to.map(MessageHandle::from),
    }
}
