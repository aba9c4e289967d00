use std::sync::{Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

use crate::{Message, MessageHandler};

// Handlers registered on a session, grouped by topic.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, MessageHandler)>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.topics.iter().map(|(topic, handlers)| (topic, handlers.len())))
            .finish()
    }
}

impl Subscribers {
    pub(crate) fn insert(&mut self, topic: &str, handler: MessageHandler) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.topics
            .entry(topic.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    // Returns `true` when the removed handler was the last one of its topic.
    pub(crate) fn remove(&mut self, topic: &str, id: u64) -> bool {
        let Some(handlers) = self.topics.get_mut(topic) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() < before;

        if handlers.is_empty() {
            let _ = self.topics.remove(topic);
        }

        removed && !self.topics.contains_key(topic)
    }

    pub(crate) fn handlers(&self, topic: &str) -> Vec<MessageHandler> {
        self.topics
            .get(topic)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }
}

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Delivers a message to all the handlers of its topic and returns how many
// handlers received it. The lock is released before invoking the handlers,
// so a handler is free to subscribe or publish.
pub(crate) fn dispatch(subscribers: &Mutex<Subscribers>, message: &Message) -> usize {
    let handlers = lock(subscribers).handlers(&message.topic);
    for handler in &handlers {
        handler(message.clone());
    }
    handlers.len()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::{Message, MessageHandler};

    use super::{Subscribers, dispatch};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> MessageHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn insert_and_remove() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut subscribers = Subscribers::default();

        let first = subscribers.insert("alarm.d1", counting_handler(&counter));
        let second = subscribers.insert("alarm.d1", counting_handler(&counter));
        assert_ne!(first, second);
        assert_eq!(subscribers.count("alarm.d1"), 2);

        // Another handler is still registered.
        assert!(!subscribers.remove("alarm.d1", first));
        // Removing twice has no effect.
        assert!(!subscribers.remove("alarm.d1", first));
        // The last handler of the topic.
        assert!(subscribers.remove("alarm.d1", second));
        assert_eq!(subscribers.total(), 0);
    }

    #[test]
    fn dispatch_to_exact_topic() {
        let counter = Arc::new(AtomicUsize::new(0));
        let subscribers = Mutex::new(Subscribers::default());

        let _ = subscribers
            .lock()
            .unwrap()
            .insert("operation.get.d1", counting_handler(&counter));

        assert_eq!(
            dispatch(&subscribers, &Message::new("operation.get.d1", "{}")),
            1
        );
        assert_eq!(
            dispatch(&subscribers, &Message::new("operation.get.d2", "{}")),
            0
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
