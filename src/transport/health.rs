//! Link health and messenger counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Coarse link health, published to observers via a `watch` channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportHealth {
    /// Writes and decodes succeeding.
    #[default]
    Healthy,
    /// Something failed recently; the reason is a short diagnostic string.
    Degraded(String),
}

impl TransportHealth {
    /// Whether the link is healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for TransportHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
        }
    }
}

/// Running counters kept by a messenger.
#[derive(Debug, Default)]
pub struct MessengerStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    fragments_sent: AtomicU64,
    fragment_failures: AtomicU64,
    malformed_packets: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time copy of [`MessengerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Messages fully written.
    pub messages_sent: u64,
    /// Messages reassembled and decoded.
    pub messages_received: u64,
    /// Fragment writes that succeeded.
    pub fragments_sent: u64,
    /// Fragment writes that failed, retries included.
    pub fragment_failures: u64,
    /// Packets too short to hold a fragment header.
    pub malformed_packets: u64,
    /// Reassembled payloads that failed envelope decoding.
    pub decode_failures: u64,
}

impl MessengerStats {
    pub(crate) fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fragment_sent(&self) {
        self.fragments_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fragment_failed(&self) {
        self.fragment_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed_packet(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            fragments_sent: self.fragments_sent.load(Ordering::Relaxed),
            fragment_failures: self.fragment_failures.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_display() {
        assert_eq!(TransportHealth::Healthy.to_string(), "healthy");
        let degraded = TransportHealth::Degraded("fragment_write_failed".into());
        assert!(!degraded.is_healthy());
        assert_eq!(degraded.to_string(), "degraded: fragment_write_failed");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = MessengerStats::default();
        stats.fragment_sent();
        stats.fragment_sent();
        stats.fragment_failed();
        stats.decode_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.fragments_sent, 2);
        assert_eq!(snap.fragment_failures, 1);
        assert_eq!(snap.decode_failures, 1);
        assert_eq!(snap.messages_sent, 0);
    }
}
