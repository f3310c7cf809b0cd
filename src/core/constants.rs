//! Protocol constants shared by both peers.
//!
//! Wire-level values (header size, tags, protocol version) MUST NOT change
//! without bumping [`PROTOCOL_VERSION`]. Timing values are defaults only and
//! can be overridden through [`SyncConfig`](super::SyncConfig).

use std::time::Duration;

// =============================================================================
// PROTOCOL
// =============================================================================

/// Envelope protocol version carried by every control message.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// LINK BUDGET
// =============================================================================

/// Default negotiated link MTU.
pub const DEFAULT_MTU: usize = 512;

/// Lower-layer envelope overhead per packet (e.g. the 3-byte ATT header).
pub const DEFAULT_LINK_OVERHEAD: usize = 3;

/// Fragment header size: message id + index + total.
pub const FRAGMENT_HEADER_SIZE: usize = 3;

/// Default usable payload per fragment (`DEFAULT_MTU - 3 - 3`).
pub const DEFAULT_USABLE_PAYLOAD: usize =
    DEFAULT_MTU - DEFAULT_LINK_OVERHEAD - FRAGMENT_HEADER_SIZE;

// =============================================================================
// RELIABILITY
// =============================================================================

/// Send attempts per fragment and propose attempts per event.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How long to wait for an EventAck / EventRejected.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after each fragment write so the link's flow control keeps up.
pub const DEFAULT_FRAGMENT_DELAY: Duration = Duration::from_millis(30);

/// Base of the linear-growth backoff between propose attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

// =============================================================================
// REASSEMBLY & DEDUP
// =============================================================================

/// Incomplete reassembly sessions older than this are purged.
pub const DEFAULT_REASSEMBLY_TTL: Duration = Duration::from_secs(10);

/// Number of recently applied remote event ids remembered for dedup.
pub const DEFAULT_DEDUP_CAPACITY: usize = 512;

// =============================================================================
// SESSION
// =============================================================================

/// Timeout for the identity exchange right after the link comes up.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(15);

/// How long two revealed cards stay face up before the pair is resolved.
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(700);

/// Buffer size of the broadcast channels fanning out messages and events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Reason sent with a SessionLeft when none is given.
pub const DEFAULT_LEAVE_REASON: &str = "user_left";
