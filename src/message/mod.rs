//! Wire messages and the envelope codec.

mod codec;
mod types;

pub use codec::*;
pub use types::*;
