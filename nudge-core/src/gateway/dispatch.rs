//! Inbound event dispatch: route provider events to scoped subscriptions

use crate::models::{ChatId, InboundEvent, MessageHandle};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Which inbound events a subscription wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Button presses on one interactive message
    CallbacksOn(MessageHandle),
    /// Plain text messages posted in one chat
    TextIn(ChatId),
}

impl EventFilter {
    pub fn matches(&self, event: &InboundEvent) -> bool {
        match (self, event) {
            (EventFilter::CallbacksOn(handle), InboundEvent::Callback { message, .. }) => {
                handle == message
            }
            (EventFilter::TextIn(chat_id), InboundEvent::Text { chat, .. }) => chat_id == chat,
            _ => false,
        }
    }
}

struct Listener {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<InboundEvent>,
}

/// Registry of live subscriptions. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Arc<DashMap<Uuid, Listener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(subscription = %id, filter = ?filter, "listener registered");
        self.listeners.insert(id, Listener { filter, tx });
        Subscription {
            id,
            rx,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Deliver an event to every matching listener. Returns how many received it.
    /// An event nobody is listening for is dropped.
    pub fn dispatch(&self, event: InboundEvent) -> usize {
        let targets: Vec<mpsc::UnboundedSender<InboundEvent>> = self
            .listeners
            .iter()
            .filter(|entry| entry.filter.matches(&event))
            .map(|entry| entry.tx.clone())
            .collect();

        let delivered = targets
            .into_iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count();
        if delivered == 0 {
            tracing::debug!(
                chat = %event.chat(),
                message = %event.message(),
                "inbound event has no listener; ignored"
            );
        }
        delivered
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// A registered listener. Dropping it unregisters the listener.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<InboundEvent>,
    listeners: Arc<DashMap<Uuid, Listener>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next matching event. Pending until one arrives.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.rx.recv().await
    }

    /// Unregister explicitly (same as dropping).
    pub fn cancel(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.listeners.remove(&self.id).is_some() {
            tracing::debug!(subscription = %self.id, "listener unregistered");
        } else {
            tracing::error!(
                subscription = %self.id,
                "listener was missing at unregistration; registry is inconsistent"
            );
        }
    }
}
