//! Error types shared across the workspace.

use thiserror::Error;

/// Error types covering setup failures, timing faults, and the control path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PulseError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// GPIO register window could not be mapped or accessed.
    #[error("gpio error: {0}")]
    Gpio(String),

    /// Control channel endpoint failure (create, bind, or receive).
    #[error("control channel error: {0}")]
    Channel(String),

    /// The absolute-time wait primitive failed. Timing guarantees are void
    /// after this, so callers must treat it as fatal.
    #[error("absolute-time wait failed: errno {errno}")]
    WaitFailed {
        /// Raw errno returned by the wait primitive.
        errno: i32,
    },

    /// A control message did not contain a usable divisor.
    #[error("invalid divisor: {0}")]
    InvalidDivisor(String),
}

/// Convenience type alias for pulsegen operations.
pub type PulseResult<T> = Result<T, PulseError>;
