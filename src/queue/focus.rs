//! Thread-safe queue that hands out the filed item nearest to a moving focus.
//!
//! Retrieval walks outward from the focus: offset 0 first, then for each
//! larger offset the backward slot before the forward one. The walk position
//! (offset and sign) survives pops, so consecutive dequeues continue where the
//! previous one stopped. It restarts from the focus whenever the focus moves
//! or the underlying map changes shape (an item was added, removed or
//! re-filed), because the nearest item may now be somewhere else.
//!
//! Two further rules:
//! - when the only non-empty key is [`UNPLACED`], those items are drained
//!   directly; they were taken off screen before being serviced;
//! - the backward walk never goes below index 1, so a leading placeholder at
//!   index 0 is not picked up by the backward search.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::indexed::IndexedPriorityMap;
use crate::error::QueueError;
use crate::models::{Indexable, ListenerId, UNPLACED};

/// Outcome of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeued<T> {
    Item(T),
    TimedOut,
    Stopped,
}

struct QueueState<T: Indexable + Clone> {
    map: IndexedPriorityMap<T>,
    subscriptions: HashMap<T::Id, ListenerId>,
    focus: i32,
    offset: i32,
    sign: i32,
    seen_revision: u64,
    stopped: bool,
}

impl<T: Indexable + Clone> QueueState<T> {
    fn reset_floaters(&mut self) {
        self.offset = 0;
        self.sign = 1;
    }

    fn observe_revision(&mut self) {
        let revision = self.map.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.reset_floaters();
        }
    }

    fn unsubscribe(&mut self, item: &T) {
        if let Some(token) = self.subscriptions.remove(&item.id()) {
            item.remove_index_listener(token);
        }
    }

    fn pop_nearest(&mut self) -> Option<T> {
        self.observe_revision();
        let (first, last) = (self.map.first_key()?, self.map.last_key()?);

        if self.map.key_count() == 1 && self.map.try_get(UNPLACED).is_some() {
            trace!("Draining offscreen item");
            return self.take(UNPLACED);
        }

        // Farthest offset at which the walk can still hit a key.
        let reach = (last - self.focus)
            .max(self.focus - first.max(1))
            .max(0);

        let mut index = self.focus + self.offset * self.sign;
        while self.map.try_get(index).is_none() {
            self.sign = -self.sign;
            if self.sign < 0 {
                self.offset += 1;
            }
            if self.offset > reach {
                // Only keys the backward clamp hides are left.
                debug!(focus = self.focus, key = first, "Walk exhausted, taking lowest key");
                index = first;
                break;
            }
            index = self.focus + self.offset * self.sign;
            if self.sign < 0 {
                index = index.max(1);
            }
        }
        self.take(index)
    }

    fn take(&mut self, key: i32) -> Option<T> {
        match self.map.pop_first(key) {
            Ok(item) => {
                self.unsubscribe(&item);
                Some(item)
            }
            Err(_) => None,
        }
    }
}

impl<T: Indexable + Clone> Drop for QueueState<T> {
    fn drop(&mut self) {
        for item in self.map.drain() {
            if let Some(token) = self.subscriptions.remove(&item.id()) {
                item.remove_index_listener(token);
            }
        }
    }
}

struct Shared<T: Indexable + Clone> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

/// Nearest-to-focus queue shared between one producer and one consumer.
///
/// Cloning yields another handle to the same queue.
pub struct FocusOrderedQueue<T: Indexable + Clone> {
    shared: Arc<Shared<T>>,
}

impl<T: Indexable + Clone> Clone for FocusOrderedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> FocusOrderedQueue<T>
where
    T: Indexable + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    map: IndexedPriorityMap::new(),
                    subscriptions: HashMap::new(),
                    focus: 0,
                    offset: 0,
                    sign: 1,
                    seen_revision: 0,
                    stopped: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Files `item` at its current index and wakes a waiting consumer.
    ///
    /// The item stays subscribed for index changes until it is dequeued, so
    /// it follows its cover through reorders.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        state.map.add(item.clone())?;

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let token = item.on_index_changed(Arc::new(move |id, _old, new| {
            if let Some(shared) = weak.upgrade() {
                let mut state = shared.state.lock();
                if state.map.reindex(id, new) {
                    state.observe_revision();
                }
            }
        }));
        state.subscriptions.insert(item.id(), token);

        // The index may have moved before the subscription was in place.
        let current = item.index();
        state.map.reindex(item.id(), current);
        state.observe_revision();
        drop(state);

        self.shared.available.notify_one();
        Ok(())
    }

    /// Removes a queued item without handing it to the consumer.
    pub fn remove(&self, item: &T) -> Result<T, QueueError> {
        let mut state = self.shared.state.lock();
        let removed = state.map.remove(item.id())?;
        state.unsubscribe(&removed);
        state.observe_revision();
        Ok(removed)
    }

    /// Pops the nearest item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.shared.state.lock().pop_nearest()
    }

    /// Blocks until an item is available or the queue is stopped.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(item) = state.pop_nearest() {
                return Some(item);
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout` waiting for an item.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if state.stopped {
                return Dequeued::Stopped;
            }
            if let Some(item) = state.pop_nearest() {
                return Dequeued::Item(item);
            }
            if self
                .shared
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.stopped {
                    return Dequeued::Stopped;
                }
                return match state.pop_nearest() {
                    Some(item) => Dequeued::Item(item),
                    None => Dequeued::TimedOut,
                };
            }
        }
    }

    pub fn focus(&self) -> i32 {
        self.shared.state.lock().focus
    }

    /// Moves the focus. Setting the current value leaves the walk untouched.
    pub fn set_focus(&self, focus: i32) {
        let mut state = self.shared.state.lock();
        if state.focus != focus {
            state.focus = focus;
            state.reset_floaters();
        }
    }

    /// Makes every pending and future blocking dequeue return `Stopped`.
    pub fn stop(&self) {
        self.shared.state.lock().stopped = true;
        self.shared.available.notify_all();
    }

    pub fn resume(&self) {
        self.shared.state.lock().stopped = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopped
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.shared.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().map.is_empty()
    }

    /// Number of distinct keys holding items.
    pub fn key_count(&self) -> usize {
        self.shared.state.lock().map.key_count()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.shared.state.lock().map.contains(item.id())
    }

    /// Empties the queue, returning everything that was still filed.
    pub fn clear(&self) -> Vec<T> {
        let mut state = self.shared.state.lock();
        let items = state.map.drain();
        for item in &items {
            state.unsubscribe(item);
        }
        state.observe_revision();
        items
    }
}

impl<T> Default for FocusOrderedQueue<T>
where
    T: Indexable + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
