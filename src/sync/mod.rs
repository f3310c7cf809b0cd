//! Sync Layer
//!
//! Implements:
//! - Event-sourced state replication with monotonic versions
//! - Validate-send-ack-apply for local events, bounded retries with backoff
//! - Idempotent remote apply through a bounded dedup window
//! - Turn orchestration and the initial identity exchange

mod dedup;
mod engine;
mod matching;
mod session;

pub use dedup::*;
pub use engine::*;
pub use matching::*;
pub use session::*;
