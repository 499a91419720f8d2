//! Common types shared across the pulsegen workspace: configuration,
//! errors, the shared period cell, and jitter accounting.

pub mod config;
pub mod error;
pub mod jitter;
pub mod period;

pub use config::*;
pub use error::*;
pub use jitter::*;
pub use period::*;
