//! Common utilities for acceptance tests.

#![allow(dead_code)] // Some helpers only serve the RT-privileged tests

use pulsegen_common::PulseConfig;
use std::fs;
use std::time::Duration;

/// Test configuration with a short settle delay so runs stay fast.
pub fn fast_config(period_ns: u64) -> PulseConfig {
    PulseConfig {
        period_ns,
        settle_time: Duration::from_millis(5),
        ..PulseConfig::default()
    }
}

/// Check if the system has a PREEMPT_RT kernel.
pub fn has_preempt_rt() -> bool {
    if let Ok(version) = fs::read_to_string("/proc/version") {
        version.contains("PREEMPT_RT") || version.contains("PREEMPT RT")
    } else {
        false
    }
}

/// Check if running as root (required for RT priority).
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions.
    unsafe { libc::geteuid() == 0 }
}
