use std::sync::{Arc, Mutex};

use bytes::Bytes;

use hashbrown::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::subscribers::{Subscribers, dispatch, lock};
use crate::{Message, MessageHandler, Session, Subscription};

#[derive(Debug, Default)]
struct Inner {
    subscribers: Mutex<Subscribers>,
    published: Mutex<HashMap<String, usize>>,
}

/// An in-process broker.
///
/// Every message published through one of its sessions is delivered
/// synchronously, before `publish` returns, to all the handlers subscribed to
/// the same topic through any of its sessions.
///
/// The broker keeps track of how many messages were published on each topic
/// and of the active subscriptions.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Creates a [`MemoryBroker`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new [`MemorySession`] to the broker.
    #[must_use]
    pub fn connect(&self) -> MemorySession {
        MemorySession {
            broker: self.clone(),
        }
    }

    /// Delivers a payload to the handlers of a topic and returns how many
    /// handlers received it.
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        *lock(&self.inner.published)
            .entry(topic.to_owned())
            .or_default() += 1;

        let delivered = dispatch(&self.inner.subscribers, &Message::new(topic, payload));
        if delivered == 0 {
            debug!("No subscribers for topic `{topic}`, discard the message");
        }
        delivered
    }

    /// Returns how many messages were published on a topic.
    #[must_use]
    pub fn published(&self, topic: &str) -> usize {
        lock(&self.inner.published).get(topic).copied().unwrap_or(0)
    }

    /// Returns how many messages were published on topics starting with the
    /// given prefix.
    #[must_use]
    pub fn published_with_prefix(&self, prefix: &str) -> usize {
        lock(&self.inner.published)
            .iter()
            .filter(|(topic, _)| topic.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns the number of active subscriptions to a topic.
    #[must_use]
    pub fn subscriptions(&self, topic: &str) -> usize {
        lock(&self.inner.subscribers).count(topic)
    }

    /// Returns the number of active subscriptions across all topics.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        lock(&self.inner.subscribers).total()
    }

    fn register(&self, topic: &str, handler: MessageHandler) -> Subscription {
        let id = lock(&self.inner.subscribers).insert(topic, handler);

        let inner = Arc::clone(&self.inner);
        let owned_topic = topic.to_owned();
        Subscription::new(topic, move || {
            let _ = lock(&inner.subscribers).remove(&owned_topic, id);
        })
    }
}

/// A session connected to a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemorySession {
    broker: MemoryBroker,
}

impl MemorySession {
    /// Returns the [`MemoryBroker`] of the session.
    #[must_use]
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

impl Session for MemorySession {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription> {
        Ok(self.broker.register(topic, handler))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let _ = self.broker.deliver(topic, payload);
        Ok(())
    }
}
