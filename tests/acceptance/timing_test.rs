//! Timing behavior of the output driver.
//!
//! The non-ignored tests use generous tolerances so they pass on ordinary
//! time-shared schedulers; the strict variant needs root and an RT-capable
//! kernel and is ignored by default.

use super::common::{fast_config, has_preempt_rt, is_root};
use pulsegen_common::RealtimeConfig;
use pulsegen_gpio::SimulatedGpio;
use pulsegen_runtime::{apply_thread_scheduling, PulseContext, PulseDriver};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_bounded_run_accounting() {
    let config = fast_config(2_000_000);
    let ctx = Arc::new(PulseContext::new(config.period_ns));
    let mut driver =
        PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config).max_cycles(25);

    driver.init().unwrap();
    driver.run().unwrap();

    assert_eq!(driver.cycle_count(), 25);
    // Cycle 0 is excluded; the rest accumulate until a report resets them.
    // 2 s window / 2 ms period = cadence 1000, so no report fires here.
    assert_eq!(driver.stats().samples_since_report(), 24);
    assert!(driver.last_report().is_none());
}

#[test]
fn test_report_window_produces_sane_report() {
    let mut config = fast_config(5_000_000); // 5 ms
    config.report_window = Duration::from_millis(50); // cadence of 10 cycles
    let ctx = Arc::new(PulseContext::new(config.period_ns));
    let mut driver =
        PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config).max_cycles(22);

    driver.init().unwrap();
    driver.run().unwrap();

    let report = driver.last_report().expect("a report after 20 cycles");
    assert_eq!(report.cycle, 20);
    assert!(report.avg_jitter_ns <= report.max_jitter_ns);

    // Loose sanity bound on the measured interval: a plain scheduler can
    // overshoot 5 ms, but not by two orders of magnitude. No lower bound;
    // an interval following a late wake is legitimately short.
    assert!(report.actual_interval_ns > 0);
    assert!(report.actual_interval_ns <= 500_000_000);

    // Accumulators reset after the report.
    assert_eq!(driver.stats().samples_since_report(), 1);
}

#[test]
#[ignore = "Requires root and an RT-capable kernel"]
fn test_jitter_bound_under_rt_priority() {
    if !is_root() {
        eprintln!("Skipping: not running as root");
        return;
    }
    if !has_preempt_rt() {
        eprintln!("Warning: no PREEMPT_RT kernel detected, bound may be optimistic");
    }

    let rt = RealtimeConfig::default(); // SCHED_FIFO, priority 99
    apply_thread_scheduling(&rt).unwrap();

    let mut config = fast_config(1_000_000); // 1 ms
    config.report_window = Duration::from_millis(100);
    let ctx = Arc::new(PulseContext::new(config.period_ns));
    let mut driver =
        PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config).max_cycles(500);

    driver.init().unwrap();
    driver.run().unwrap();

    // Under SCHED_FIFO the absolute-time wait should keep worst-case
    // jitter well below one period.
    assert!(
        driver.stats().max_jitter_ns() < 500_000,
        "max jitter {} ns exceeds 500 us",
        driver.stats().max_jitter_ns()
    );
}
