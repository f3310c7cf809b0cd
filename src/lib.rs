//! # memolink
//!
//! Reliable two-peer state replication for a turn-based memory game played
//! over a slow, small-MTU, possibly lossy point-to-point link.
//!
//! - **Framing**: envelopes split into 3-byte-header fragments sized to the MTU
//! - **Reliability**: per-fragment retries, ack correlation with timeouts
//! - **Consistency**: one mutex serializes every transition, versions grow by
//!   exactly one per applied event on both peers
//! - **Idempotence**: redelivered events are recognised and ignored
//!
//! ## Feature Flags
//!
//! - `transport` (default): fragmenting messenger over a [`Transport`](crate::core::Transport)
//! - `sync` (default): sync engine, session orchestration, identity exchange
//!
//! ## Modules
//!
//! - [`core`]: constants, configuration, error types and the link trait (always included)
//! - [`game`]: state model, validator and reducer (always included)
//! - [`message`]: wire messages and the envelope codec (always included)
//! - [`transport`]: fragments, reassembly, reliable messenger (requires `transport`)
//! - [`sync`]: sync engine and game session (requires `sync`)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use memolink::prelude::*;
//!
//! # async fn demo() -> Result<(), MemoError> {
//! let (host_link, guest_link) = MemoryLink::pair(64);
//! let config = SyncConfig::default();
//!
//! let host = Arc::new(ReliableMessenger::new(host_link, config.clone())?);
//! let guest = Arc::new(ReliableMessenger::new(guest_link, config)?);
//!
//! let ana = LocalIdentity::new("ana", "Ana", 'a');
//! let bo = LocalIdentity::new("bo", "Bo", 'b');
//! let (roster, _) = tokio::join!(
//!     exchange_identities(&host, &ana, PeerRole::Host),
//!     exchange_identities(&guest, &bo, PeerRole::Guest),
//! );
//!
//! let engine = Arc::new(SyncEngine::new(ana.id.clone(), host));
//! let session = GameSession::new(engine, ana);
//! session.start(4, 4, roster?).await?;
//!
//! match session.on_card_clicked(CardId::from_index(0)).await? {
//!     ClickOutcome::Revealed => println!("pick another card"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Domain model (always included)
pub mod game;

// Wire messages (always included)
pub mod message;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Sync layer (feature-gated)
#[cfg(feature = "sync")]
#[cfg_attr(docsrs, doc(cfg(feature = "sync")))]
pub mod sync;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::game::*;
    pub use crate::message::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        Fragment, FrameCodec, FrameError, MemoryLink, MessengerError, Reassembler,
        ReliableMessenger, StatsSnapshot, TransportHealth,
    };

    #[cfg(feature = "sync")]
    pub use crate::sync::*;
}

// Re-export commonly used items at crate root
pub use crate::core::{DomainError, MemoError, SyncConfig};
pub use crate::game::{GameState, reduce, validate};
pub use crate::message::{EnvelopeCodec, GameEvent, Message};

#[cfg(feature = "transport")]
pub use crate::transport::{FrameCodec, Reassembler, ReliableMessenger};

#[cfg(feature = "sync")]
pub use crate::sync::{GameSession, SyncEngine};
