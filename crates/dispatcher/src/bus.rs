//! EventBus - fire-and-forget fan-out to any number of subscribers
//!
//! Every subscriber owns a bounded `async_channel` receiver, usable from
//! async tasks (`recv().await`) and plain threads (`recv_blocking`). A full
//! or closed subscriber never blocks the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, trace};

/// Default per-subscriber queue capacity
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast bus
pub struct EventBus<T: Clone> {
    name: &'static str,
    capacity: usize,
    subscribers: Mutex<Vec<Sender<T>>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone> EventBus<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// New subscriber with the bus capacity
    pub fn subscribe(&self) -> Receiver<T> {
        self.subscribe_with_capacity(self.capacity)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<T> {
        let (tx, rx) = bounded(capacity.max(1));
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.push(tx);
        debug!(bus = self.name, subscribers = subscribers.len(), "subscriber added");
        rx
    }

    /// Deliver `item` to every live subscriber; returns how many got it.
    ///
    /// Closed subscribers are removed. Full subscribers miss this item.
    pub fn publish(&self, item: T) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(item.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(bus = self.name, "subscriber full, item dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Items missed by full subscribers
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drop every sender; receivers drain and then see the channel closed
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if !subscribers.is_empty() {
            debug!(bus = self.name, subscribers = subscribers.len(), "bus closed");
        }
        subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_to_all_subscribers() {
        let bus = EventBus::new("test", 8);
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.publish(1u32), 2);
        assert_eq!(a.try_recv().unwrap(), 1);
        assert_eq!(b.try_recv().unwrap(), 1);
    }

    #[test]
    fn test_no_subscribers_is_fine() {
        let bus = EventBus::new("test", 8);
        assert_eq!(bus.publish("x"), 0);
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_closed_subscriber_removed() {
        let bus = EventBus::new("test", 8);
        let a = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.publish(5u8), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(a.try_recv().unwrap(), 5);
    }

    #[test]
    fn test_full_subscriber_does_not_block() {
        let bus = EventBus::new("test", 1);
        let slow = bus.subscribe();
        let fast = bus.subscribe_with_capacity(16);
        for i in 0..4u32 {
            bus.publish(i);
        }
        assert_eq!(slow.len(), 1);
        assert_eq!(fast.len(), 4);
        assert_eq!(bus.dropped(), 3);
    }

    #[tokio::test]
    async fn test_close_ends_async_receivers() {
        let bus = EventBus::new("test", 4);
        let rx = bus.subscribe();
        bus.publish(7i32);
        bus.close();
        assert_eq!(rx.recv().await.unwrap(), 7);
        assert!(rx.recv().await.is_err());
    }
}
