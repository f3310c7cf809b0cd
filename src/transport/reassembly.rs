//! Fragment reassembly.
//!
//! Sessions are keyed by message id and expire `ttl` after they were opened,
//! complete or not. Expired sessions are purged at the start of every
//! [`Reassembler::add_fragment`] call.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::constants::DEFAULT_REASSEMBLY_TTL;

use super::frame::Fragment;

#[derive(Debug)]
struct Session {
    fragments: Vec<Fragment>,
    expected_total: Option<u8>,
    created_at: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            fragments: Vec::new(),
            expected_total: None,
            created_at: now,
        }
    }

    fn reset(&mut self, now: Instant) {
        self.fragments.clear();
        self.expected_total = None;
        self.created_at = now;
    }

    fn holds(&self, index: u8) -> bool {
        self.fragments.iter().any(|f| f.index == index)
    }

    /// A different first fragment under the same id means the id was
    /// recycled by a new transfer. An identical one is a retransmission.
    fn is_superseded_by(&self, first: &Fragment) -> bool {
        self.fragments
            .iter()
            .any(|f| f.index == 0 && f.payload != first.payload)
    }
}

/// Rebuilds payloads from fragments.
///
/// Owned by exactly one receive loop; not shared.
#[derive(Debug)]
pub struct Reassembler {
    sessions: HashMap<u8, Session>,
    ttl: Duration,
}

impl Reassembler {
    /// Create a reassembler whose sessions live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Feed one fragment. Returns the whole payload once every fragment of
    /// its message has arrived.
    pub fn add_fragment(&mut self, fragment: Fragment) -> Option<Vec<u8>> {
        self.add_fragment_at(fragment, Instant::now())
    }

    /// [`add_fragment`](Self::add_fragment) with an explicit clock reading.
    pub fn add_fragment_at(&mut self, fragment: Fragment, now: Instant) -> Option<Vec<u8>> {
        self.purge_stale(now);

        if fragment.is_whole() {
            return Some(fragment.payload);
        }

        if fragment.index > fragment.total_fragments {
            return None;
        }

        let message_id = fragment.message_id;
        let total = fragment.total_fragments;
        let session = self
            .sessions
            .entry(message_id)
            .or_insert_with(|| Session::new(now));

        if fragment.index == 0 && session.is_superseded_by(&fragment) {
            tracing::debug!(message_id, "message id reused, restarting session");
            session.reset(now);
        }

        if session.expected_total.is_some_and(|expected| expected != total) {
            tracing::debug!(
                message_id,
                expected = ?session.expected_total,
                got = total,
                "conflicting fragment count, restarting session"
            );
            session.reset(now);
        }
        session.expected_total.get_or_insert(total);

        if !session.holds(fragment.index) {
            session.fragments.push(fragment);
        }

        if session.fragments.len() != total as usize + 1 {
            return None;
        }

        let mut fragments = self.sessions.remove(&message_id)?.fragments;
        fragments.sort_by_key(|f| f.index);
        let contiguous = fragments
            .iter()
            .enumerate()
            .all(|(i, f)| f.index as usize == i);
        if !contiguous {
            tracing::debug!(message_id, "non-contiguous fragment set dropped");
            return None;
        }

        Some(fragments.into_iter().flat_map(|f| f.payload).collect())
    }

    /// Drop every in-flight session.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Number of incomplete sessions held.
    pub fn pending_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn purge_stale(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.sessions
            .retain(|_, session| now.saturating_duration_since(session.created_at) <= ttl);
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_TTL)
    }
}
