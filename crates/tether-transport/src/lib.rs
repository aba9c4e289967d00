//! The `tether-transport` library crate provides the publish/subscribe
//! sessions over which `tether` controllers and devices exchange their
//! messages.
//!
//! A [`Session`] offers only two capabilities: subscribing a handler to a topic
//! and publishing a payload on a topic. Every subscription is represented by a
//! [`Subscription`] handle, which releases the topic either when it is
//! explicitly cancelled or when it is dropped, so no subscription outlives
//! its owner.
//!
//! Two sessions are available:
//!
//! - [`mqtt::MqttSession`], which talks to an `MQTT` broker and runs its
//!   network event loop on a `tokio` task
//! - [`memory::MemorySession`], an in-process broker which delivers messages
//!   synchronously, useful to run a controller and its devices inside the
//!   same process and to test them
//!
//! Handlers are invoked on the transport concurrency domain, possibly
//! concurrently with each other, hence they must be quick and must never
//! block.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Error management.
pub mod error;
/// An in-process broker.
pub mod memory;
/// An `MQTT` session.
pub mod mqtt;

mod subscribers;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// A message delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Topic on which the message has been published.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
}

impl Message {
    /// Creates a [`Message`].
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A subscription handler.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

type Release = Box<dyn FnOnce() + Send + Sync>;

/// A topic subscription.
///
/// The subscription is released when [`Subscription::cancel`] is called or
/// when the handle is dropped, whichever comes first.
pub struct Subscription {
    topic: String,
    release: Option<Release>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Subscription {
    /// Creates a [`Subscription`] which runs `release` exactly once.
    #[must_use]
    pub fn new(topic: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            topic: topic.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Cancels the subscription.
    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// A publish/subscribe session.
pub trait Session: Send + Sync {
    /// Subscribes a handler to a topic.
    ///
    /// When the returned future resolves, every message published on the topic
    /// through this session afterwards reaches the handler.
    ///
    /// # Errors
    ///
    /// The subscription request cannot be issued.
    fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<Subscription>> + Send;

    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// The message cannot be handed over to the transport.
    fn publish(&self, topic: &str, payload: Bytes) -> impl Future<Output = Result<()>> + Send;
}
