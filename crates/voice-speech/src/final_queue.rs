//! Bounded MPSC queue between the recognizer thread and the turn lane
//! (spec §5: "Queue depth is fixed (e.g., 8); overflow is logged and the
//! oldest non-current final is dropped, never the most recent").

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

pub struct FinalQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T: Send> FinalQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        })
    }

    /// Pushes a new final. If the queue is at capacity, the oldest queued
    /// entry is dropped (never the one being pushed) and a warning logged.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            items.pop_front();
            tracing::warn!(
                capacity = self.capacity,
                "final-transcript queue overflow; dropped oldest queued final"
            );
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
    }

    /// Awaits and pops the oldest queued final, in arrival order.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
