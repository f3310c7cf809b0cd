//! Recently-processed event ids.

use std::collections::{HashSet, VecDeque};

use crate::core::constants::DEFAULT_DEDUP_CAPACITY;
use crate::message::EventId;

/// Bounded set of event ids, evicting the oldest insertion first.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    seen: HashSet<EventId>,
    order: VecDeque<EventId>,
    capacity: usize,
}

impl DedupWindow {
    /// Window holding at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether `id` was remembered and not yet evicted.
    pub fn contains(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    /// Remember `id`. Returns `false` if it was already present.
    pub fn remember(&mut self, id: EventId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    /// Ids held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum ids held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
