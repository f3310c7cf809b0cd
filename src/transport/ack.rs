//! Acknowledgment correlation.
//!
//! Matches inbound feedback to the task waiting on its event id. Feedback
//! that arrives before anyone waits is held in a bounded cache so a later
//! wait returns at once.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::message::{EventId, FeedbackEvent};

/// Default number of early feedback events held.
pub const DEFAULT_ACK_CACHE_CAPACITY: usize = 128;

#[derive(Debug)]
struct Pending {
    token: u64,
    tx: oneshot::Sender<FeedbackEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<EventId, Pending>,
    cached: HashMap<EventId, FeedbackEvent>,
    cache_order: VecDeque<EventId>,
    next_token: u64,
}

/// Pending ack waiters plus early arrivals.
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct AckRegistry {
    inner: Mutex<Inner>,
    cache_capacity: usize,
}

/// Outcome of [`AckRegistry::register`].
#[derive(Debug)]
pub enum AckWait<'a> {
    /// Feedback was already cached.
    Ready(FeedbackEvent),
    /// Wait on the returned handle.
    Pending(AckWaiter<'a>),
}

/// Registered wait for one event id.
///
/// Dropping it deregisters the wait, whether it completed, timed out or was
/// cancelled.
#[derive(Debug)]
pub struct AckWaiter<'a> {
    registry: &'a AckRegistry,
    event_id: EventId,
    token: u64,
    /// Resolves when matching feedback arrives.
    pub rx: oneshot::Receiver<FeedbackEvent>,
}

impl Drop for AckWaiter<'_> {
    fn drop(&mut self) {
        self.registry.deregister(&self.event_id, self.token);
    }
}

impl AckRegistry {
    /// Registry caching up to `cache_capacity` early feedback events.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cache_capacity: cache_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting for feedback on `event_id`.
    ///
    /// Cache lookup and registration happen under one lock, so feedback
    /// cannot slip between them.
    pub fn register(&self, event_id: EventId) -> AckWait<'_> {
        let mut inner = self.lock();

        if let Some(feedback) = inner.cached.remove(&event_id) {
            inner.cache_order.retain(|id| id != &event_id);
            return AckWait::Ready(feedback);
        }

        let (tx, rx) = oneshot::channel();
        let token = inner.next_token;
        inner.next_token = inner.next_token.wrapping_add(1);
        inner.pending.insert(event_id, Pending { token, tx });

        AckWait::Pending(AckWaiter {
            registry: self,
            event_id,
            token,
            rx,
        })
    }

    /// Deliver feedback. Returns `true` if a waiter received it; otherwise
    /// it is cached for a later [`register`](Self::register).
    pub fn resolve(&self, feedback: FeedbackEvent) -> bool {
        let mut inner = self.lock();
        let event_id = feedback.original_event_id;

        if let Some(pending) = inner.pending.remove(&event_id) {
            return match pending.tx.send(feedback) {
                Ok(()) => true,
                Err(feedback) => {
                    self.cache(&mut inner, feedback);
                    false
                }
            };
        }

        self.cache(&mut inner, feedback);
        false
    }

    fn cache(&self, inner: &mut Inner, feedback: FeedbackEvent) {
        let event_id = feedback.original_event_id;
        if inner.cached.insert(event_id, feedback).is_none() {
            inner.cache_order.push_back(event_id);
        }
        while inner.cache_order.len() > self.cache_capacity {
            if let Some(oldest) = inner.cache_order.pop_front() {
                inner.cached.remove(&oldest);
            }
        }
    }

    fn deregister(&self, event_id: &EventId, token: u64) {
        let mut inner = self.lock();
        if inner
            .pending
            .get(event_id)
            .is_some_and(|pending| pending.token == token)
        {
            inner.pending.remove(event_id);
        }
    }

    /// Number of registered waiters.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of cached early arrivals.
    pub fn cached_count(&self) -> usize {
        self.lock().cached.len()
    }
}

impl Default for AckRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_CACHE_CAPACITY)
    }
}
