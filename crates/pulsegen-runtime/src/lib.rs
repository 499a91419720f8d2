//! Real-time core for the pulsegen square-wave generator: the periodic
//! output driver, the divisor control channel, and the environment setup
//! (memory locking, scheduling, XDDP endpoint).

pub mod context;
pub mod control;
pub mod driver;
pub mod realtime;

#[cfg(target_os = "linux")]
pub mod xddp;

pub use context::*;
pub use control::*;
pub use driver::*;
pub use realtime::*;

#[cfg(target_os = "linux")]
pub use xddp::XddpEndpoint;
