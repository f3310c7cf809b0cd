//! Core constants, configuration, error types and traits.

mod config;
pub mod constants;
mod error;
#[cfg(feature = "transport")]
mod traits;

pub use config::*;
pub use error::*;
#[cfg(feature = "transport")]
pub use traits::*;
