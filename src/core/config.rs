//! Runtime configuration.
//!
//! Every timeout, retry count and size budget lives in one [`SyncConfig`]
//! value that is handed to constructors. Nothing reads ambient globals.

use std::time::Duration;

use super::constants::*;
use super::error::ConfigError;

/// Configuration shared by the messenger, the sync engine and the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Negotiated link MTU in bytes.
    pub mtu: usize,
    /// Per-packet overhead added by the layer below the fragment header.
    pub link_overhead: usize,
    /// Send attempts per fragment, and propose attempts per local event.
    pub max_retries: u32,
    /// Ack/reject wait bound.
    pub ack_timeout: Duration,
    /// Pause after every fragment write.
    pub fragment_delay: Duration,
    /// TTL of incomplete reassembly sessions.
    pub reassembly_ttl: Duration,
    /// Capacity of the remote-event dedup window.
    pub dedup_capacity: usize,
    /// Backoff base; attempt `n` sleeps `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Identity exchange bound.
    pub identity_timeout: Duration,
    /// Delay before resolving a revealed pair.
    pub reveal_delay: Duration,
    /// Broadcast channel capacity.
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            link_overhead: DEFAULT_LINK_OVERHEAD,
            max_retries: DEFAULT_MAX_RETRIES,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            fragment_delay: DEFAULT_FRAGMENT_DELAY,
            reassembly_ttl: DEFAULT_REASSEMBLY_TTL,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with protocol defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the negotiated MTU.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the lower-layer per-packet overhead.
    pub fn link_overhead(mut self, overhead: usize) -> Self {
        self.link_overhead = overhead;
        self
    }

    /// Set the retry budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the ack timeout.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the inter-fragment delay.
    pub fn fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    /// Set the reassembly session TTL.
    pub fn reassembly_ttl(mut self, ttl: Duration) -> Self {
        self.reassembly_ttl = ttl;
        self
    }

    /// Set the dedup window capacity.
    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Set the retry backoff base.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the identity exchange timeout.
    pub fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    /// Set the pair reveal delay.
    pub fn reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    /// Set the broadcast channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Payload bytes available to each fragment after all per-packet overhead.
    ///
    /// Saturates at zero; [`validate`](Self::validate) rejects that case.
    pub fn usable_payload(&self) -> usize {
        self.mtu
            .saturating_sub(self.link_overhead)
            .saturating_sub(FRAGMENT_HEADER_SIZE)
    }

    /// Check that the configuration can actually move data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.usable_payload() == 0 {
            return Err(ConfigError::MtuTooSmall {
                mtu: self.mtu,
                overhead: self.link_overhead + FRAGMENT_HEADER_SIZE,
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.dedup_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("dedup_capacity"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("channel_capacity"));
        }
        Ok(())
    }
}

/// Per-send policy for the reliable messenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    /// Attempts per fragment before the whole send is aborted.
    pub max_retries: u32,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SendPolicy {
    /// Policy with an explicit retry budget.
    pub fn with_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }
}
