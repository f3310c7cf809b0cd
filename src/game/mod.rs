//! Game domain: the replicated state, the rules that guard it and the
//! transitions that advance it.
//!
//! Both functions here are pure. The sync layer runs them inside its
//! critical section, always `validate` first, then `reduce`.

mod board;
mod reducer;
mod state;
mod validator;

pub use board::*;
pub use reducer::reduce;
pub use state::*;
pub use validator::validate;
