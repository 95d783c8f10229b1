//! Approval coordinator: create interactive requests and wait for the operator's answer

use crate::approval::ApprovalError;
use crate::gateway::{ChatGateway, EventFilter, Subscription};
use crate::models::{
    ApprovalConfig, ApprovalOption, ApprovalOutcome, ApprovalRequest, ApprovalTicket, ChatId,
    ChoiceSelection, ConfigurationError, InboundEvent, InteractivePrompt, MessageHandle, Priority,
    OTHER_OPTION_LABEL,
};
use crate::services::logging::{log_error, log_interaction};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Follow-up sent after the operator picks "Other".
pub const FREE_TEXT_PROMPT: &str = "✏️ Please type your answer:";

/// Stand-in deadline for timeouts too large to add to the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalSettings {
    /// Used by [`ApprovalCoordinator::wait_default`]
    pub default_timeout: Duration,
    /// Unawaited requests older than this are swept
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self::from_config(&ApprovalConfig::default())
    }
}

impl ApprovalSettings {
    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self {
            default_timeout: config.default_timeout(),
            retention: config.retention(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

/// Removes the claimed request when `wait()` ends, however it ends.
///
/// Only removes the entry it claimed: a request re-created under the same id
/// in the meantime is left alone.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, ApprovalRequest>,
    id: &'a str,
    instance: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let instance = self.instance;
        if self
            .pending
            .remove_if(self.id, |_, request| request.instance == instance)
            .is_none()
        {
            tracing::debug!(id = %self.id, "approval request already removed");
        }
    }
}

/// Tracks approval requests and suspends callers until the operator answers.
///
/// Each request is tied to the interactive chat message that carries it; the
/// id is derived from that message's handle.
pub struct ApprovalCoordinator {
    gateway: Arc<dyn ChatGateway>,
    pending: DashMap<String, ApprovalRequest>,
    settings: ApprovalSettings,
    shutdown: watch::Sender<bool>,
}

impl ApprovalCoordinator {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        settings: ApprovalSettings,
    ) -> Result<Self, ConfigurationError> {
        let mut errors = Vec::new();
        if settings.retention.is_zero() {
            errors.push("approval retention must be positive".to_string());
        }
        if settings.sweep_interval.is_zero() {
            errors.push("approval sweep interval must be positive".to_string());
        }
        if !errors.is_empty() {
            return Err(ConfigurationError::Invalid(errors));
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            gateway,
            pending: DashMap::new(),
            settings,
            shutdown,
        })
    }

    pub fn settings(&self) -> &ApprovalSettings {
        &self.settings
    }

    /// Send an interactive request and start tracking it.
    ///
    /// The prompt offers every option plus an "Other" entry for a typed answer.
    pub async fn create(
        &self,
        question: &str,
        options: &[ApprovalOption],
        header: Option<&str>,
    ) -> Result<ApprovalTicket, ApprovalError> {
        let header = header.map(str::to_string);
        let prompt = InteractivePrompt::from_options(header.clone(), question, options);
        let handle = self
            .gateway
            .send_interactive(&prompt)
            .await
            .map_err(|err| {
                log_error(&err.to_string(), Some("sending approval request"));
                ApprovalError::GatewaySend(err)
            })?;

        let request = ApprovalRequest::new(handle, header, question, options.to_vec());
        let id = request.id.clone();
        if self.pending.insert(id.clone(), request).is_some() {
            tracing::warn!(id = %id, "replaced an existing approval request with the same id");
        }
        log_interaction("approval_created", &id, Some(question));
        Ok(ApprovalTicket { id, success: true })
    }

    /// Wait for the answer to request `id`, at most `timeout`.
    ///
    /// The request is removed when this returns, answered or not. Timing out
    /// or a coordinator shutdown yields [`ApprovalOutcome::TimedOut`].
    pub async fn wait(&self, id: &str, timeout: Duration) -> Result<ApprovalOutcome, ApprovalError> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let request = {
            let mut entry = self
                .pending
                .get_mut(id)
                .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;
            if entry.awaited {
                return Err(ApprovalError::AlreadyAwaited(id.to_string()));
            }
            entry.awaited = true;
            entry.value().clone()
        };
        let _claim = PendingGuard {
            pending: &self.pending,
            id,
            instance: request.instance,
        };

        let mut callbacks = self
            .gateway
            .subscribe(EventFilter::CallbacksOn(request.source_message.clone()));
        tracing::debug!(id = %id, timeout_ms = timeout.as_millis() as u64, "waiting for approval");

        let outcome = tokio::select! {
            outcome = self.await_answer(&request, &mut callbacks) => outcome,
            _ = tokio::time::sleep_until(deadline) => ApprovalOutcome::TimedOut,
            _ = shutdown_signalled(self.shutdown.subscribe()) => {
                tracing::debug!(id = %id, "wait interrupted by shutdown");
                ApprovalOutcome::TimedOut
            }
        };

        match &outcome {
            ApprovalOutcome::Answered { selected, .. } => {
                log_interaction("approval_answered", id, Some(selected.as_str()))
            }
            ApprovalOutcome::TimedOut => log_interaction("approval_timed_out", id, None),
        }
        Ok(outcome)
    }

    /// [`wait`](Self::wait) with the configured default timeout.
    pub async fn wait_default(&self, id: &str) -> Result<ApprovalOutcome, ApprovalError> {
        self.wait(id, self.settings.default_timeout).await
    }

    /// Create a request and wait for its answer.
    pub async fn ask(
        &self,
        question: &str,
        options: &[ApprovalOption],
        header: Option<&str>,
        timeout: Duration,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let ticket = self.create(question, options, header).await?;
        self.wait(&ticket.id, timeout).await
    }

    /// Remove requests older than the retention period that nobody is waiting on.
    pub fn cleanup_old(&self) -> usize {
        let now = Instant::now();
        let retention = self.settings.retention;
        let mut removed = 0;
        self.pending.retain(|id, request| {
            let expired =
                !request.awaited && now.saturating_duration_since(request.created_at) >= retention;
            if expired {
                tracing::debug!(id = %id, "sweeping expired approval request");
                removed += 1;
            }
            !expired
        });
        removed
    }

    /// Run [`cleanup_old`](Self::cleanup_old) every sweep interval until shutdown
    /// or until the coordinator is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::downgrade(self);
        let shutdown = self.shutdown.subscribe();
        let interval = self.settings.sweep_interval;
        tokio::spawn(sweep_loop(coordinator, shutdown, interval))
    }

    /// Resolve every in-flight and future `wait()` as timed out and stop the sweeper.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!(pending = self.pending.len(), "approval coordinator shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<ApprovalRequest> {
        self.pending.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Resolves once the operator has answered. Pending forever otherwise; the
    /// caller bounds it with the deadline.
    async fn await_answer(
        &self,
        request: &ApprovalRequest,
        callbacks: &mut Subscription,
    ) -> ApprovalOutcome {
        loop {
            let Some(event) = callbacks.recv().await else {
                return std::future::pending().await;
            };
            let InboundEvent::Callback { data, .. } = &event else {
                continue;
            };
            match request.selection_for(data) {
                Some(ChoiceSelection::Option(label)) => {
                    self.acknowledge_detached(event, Some(format!("Selected: {}", label)));
                    return ApprovalOutcome::Answered {
                        selected: label,
                        custom_text: None,
                    };
                }
                Some(ChoiceSelection::FreeText) => {
                    let chat = event.chat().clone();
                    self.acknowledge_detached(event, Some("Type your answer".to_string()));
                    let text = self.await_free_text(request, chat).await;
                    return ApprovalOutcome::Answered {
                        selected: OTHER_OPTION_LABEL.to_string(),
                        custom_text: Some(text),
                    };
                }
                None => {
                    tracing::warn!(id = %request.id, data = %data, "unrecognized choice; ignoring");
                    self.acknowledge_detached(event, None);
                }
            }
        }
    }

    /// Ask for a typed answer and return the first non-empty text from the same chat.
    ///
    /// Texts replying to some other message belong to someone else and are skipped.
    async fn await_free_text(&self, request: &ApprovalRequest, chat: ChatId) -> String {
        // Subscribe before prompting so a fast reply is not missed.
        let mut texts = self.gateway.subscribe(EventFilter::TextIn(chat));
        let follow_up = match self.gateway.send(FREE_TEXT_PROMPT, Priority::High).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(id = %request.id, error = %err, "failed to send free-text prompt; still waiting");
                None
            }
        };

        loop {
            let Some(event) = texts.recv().await else {
                return std::future::pending().await;
            };
            let InboundEvent::Text { text, reply_to, .. } = &event else {
                continue;
            };
            if !replies_to_request(reply_to.as_ref(), &request.source_message, follow_up.as_ref()) {
                continue;
            }
            let answer = text.trim().to_string();
            if answer.is_empty() {
                continue;
            }
            self.acknowledge_detached(event, None);
            return answer;
        }
    }

    /// Acknowledge in the background; the answer never waits on a throttled acknowledgement.
    fn acknowledge_detached(&self, event: InboundEvent, note: Option<String>) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            gateway.acknowledge(&event, note.as_deref()).await;
        });
    }
}

fn replies_to_request(
    reply_to: Option<&MessageHandle>,
    source: &MessageHandle,
    follow_up: Option<&MessageHandle>,
) -> bool {
    match reply_to {
        None => true,
        Some(target) => target == source || Some(target) == follow_up,
    }
}

async fn shutdown_signalled(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn sweep_loop(
    coordinator: Weak<ApprovalCoordinator>,
    shutdown: watch::Receiver<bool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                let removed = coordinator.cleanup_old();
                if removed > 0 {
                    tracing::info!(removed = removed, "swept expired approval requests");
                }
            }
            _ = shutdown_signalled(shutdown.clone()) => break,
        }
    }
    tracing::debug!("approval sweeper stopped");
}
