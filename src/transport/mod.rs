//! Transport layer.
//!
//! Turns a raw packet [`Transport`](crate::core::Transport) into a reliable
//! message pipe:
//!
//! - **Framing**: [`FrameCodec`] splits envelopes into MTU-sized [`Fragment`]s
//! - **Reassembly**: [`Reassembler`] rebuilds them, TTL-bounded and strict
//!   about gaps
//! - **Acks**: [`AckRegistry`] correlates feedback with waiting senders
//! - **Messenger**: [`ReliableMessenger`] ties it together with per-fragment
//!   retries and a background receive loop
//! - **Test link**: [`MemoryLink`] connects two peers in memory
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Sync Layer                   │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   envelope, fragments, retries, acks    │
//! ├─────────────────────────────────────────┤
//! │     Point-to-point link (MTU ~512)      │
//! └─────────────────────────────────────────┘
//! ```

mod ack;
mod frame;
mod health;
mod link;
mod messenger;
mod reassembly;

pub use ack::*;
pub use frame::*;
pub use health::*;
pub use link::MemoryLink;
pub use messenger::*;
pub use reassembly::Reassembler;
