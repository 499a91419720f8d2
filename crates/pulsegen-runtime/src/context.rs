//! Shared context for the two concurrent activities.
//!
//! The lifecycle coordinator owns one [`PulseContext`]; the output driver
//! and the control channel each hold an `Arc` into it. The context carries
//! exactly two things: the active period cell and the cooperative shutdown
//! flag. Nothing else is shared.

use pulsegen_common::PeriodCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared between the output driver and the control channel.
#[derive(Debug)]
pub struct PulseContext {
    /// Active period; written by the control channel, read once per cycle
    /// by the driver.
    pub period: PeriodCell,
    /// Cooperative cancellation flag, checked at the top of each cycle.
    shutdown: AtomicBool,
}

impl PulseContext {
    /// Create a context with the initial period.
    #[must_use]
    pub fn new(period_ns: u64) -> Self {
        Self {
            period: PeriodCell::new(period_ns),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Check whether shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request cooperative shutdown (callable from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag() {
        let ctx = PulseContext::new(100_000_000);
        assert!(!ctx.shutdown_requested());

        ctx.request_shutdown();
        assert!(ctx.shutdown_requested());
    }

    #[test]
    fn test_period_is_shared() {
        let ctx = PulseContext::new(100_000_000);
        ctx.period.divide(4);
        assert_eq!(ctx.period.get(), 25_000_000);
    }
}
