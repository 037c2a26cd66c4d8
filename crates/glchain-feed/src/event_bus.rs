//! Typed fan-out of events to any number of subscribers

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Publishes events to every subscriber's unbounded channel
///
/// Cloning the bus shares the subscriber list. Subscribers whose receiver
/// was dropped are pruned on the next publish.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: E) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            log::trace!("Event published without subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<E>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(1u32);
        bus.publish(2u32);

        assert_eq!(first.try_recv().unwrap(), 1);
        assert_eq!(first.try_recv().unwrap(), 2);
        assert_eq!(second.try_recv().unwrap(), 1);
        assert_eq!(second.try_recv().unwrap(), 2);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish("event");
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.clone().publish('x');
        assert_eq!(rx.try_recv().unwrap(), 'x');
    }
}
