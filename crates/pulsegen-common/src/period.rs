//! Shared period cell.
//!
//! The active period is the single value shared between the control channel
//! (writer) and the output driver (reader). Storing it as an atomic scalar
//! guarantees the driver never observes a torn value.

use std::sync::atomic::{AtomicU64, Ordering};

/// Single-writer / single-reader cell holding the active period in
/// nanoseconds.
///
/// The control channel is the only writer; the driver reads the value once
/// per cycle when it advances its deadline. No bound is enforced on the
/// stored value.
#[derive(Debug)]
pub struct PeriodCell(AtomicU64);

impl PeriodCell {
    /// Create a cell holding the initial period.
    #[must_use]
    pub fn new(period_ns: u64) -> Self {
        Self(AtomicU64::new(period_ns))
    }

    /// Read the active period.
    #[inline]
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Replace the active period.
    pub fn set(&self, period_ns: u64) {
        self.0.store(period_ns, Ordering::Release);
    }

    /// Apply a divisor: `period <- period / divisor` (integer division).
    ///
    /// Returns `(old, new)`. The caller must have validated `divisor != 0`.
    /// Load-then-store is sufficient here because the control channel is the
    /// only writer.
    pub fn divide(&self, divisor: u64) -> (u64, u64) {
        let old = self.get();
        let new = old / divisor;
        self.set(new);
        (old, new)
    }
}
