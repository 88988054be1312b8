//! Bounded FIFO queue with a wake signal for its consumer.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// A fixed-capacity FIFO shared by many producers and one consumer.
///
/// A full queue rejects the incoming item; what is already queued is never
/// evicted. Every accepted item wakes the consumer, and a wake with no
/// consumer waiting is kept until the next wait.
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    wake: Arc<Notify>,
}

impl<T> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Appends an item. Returns `false` if the queue is full.
    pub fn enqueue(&self, item: T) -> bool {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                warn!(
                    queue = self.name,
                    capacity = self.capacity,
                    "Queue full, dropping new item"
                );
                return false;
            }
            items.push_back(item);
        }
        self.wake.notify_one();
        true
    }

    pub fn dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Signals the consumer without adding an item.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// The consumer's wake signal, usable after the queue is gone.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }
}
