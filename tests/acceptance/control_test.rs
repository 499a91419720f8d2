//! End-to-end control channel scenarios against a running driver.

use super::common::fast_config;
use pulsegen_gpio::SimulatedGpio;
use pulsegen_runtime::{ControlChannel, MessageQueueEndpoint, PulseContext, PulseDriver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_divisor_halves_period_while_running() {
    let mut config = fast_config(2_000_000); // 2 ms
    config.report_window = Duration::from_millis(60); // cadence of 30 cycles
    let ctx = Arc::new(PulseContext::new(config.period_ns));

    let (tx, endpoint) = MessageQueueEndpoint::pair();
    let control_ctx = Arc::clone(&ctx);
    let control = thread::spawn(move || {
        ControlChannel::new(endpoint, control_ctx).run();
    });

    let retune_tx = tx.clone();
    let retuner = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        retune_tx.send(b"2".to_vec()).unwrap();
    });

    let mut driver =
        PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config).max_cycles(40);
    driver.init().unwrap();
    driver.run().unwrap();

    retuner.join().unwrap();
    drop(tx); // close the endpoint so the control thread exits
    control.join().unwrap();

    // The divisor landed while the driver was toggling.
    assert_eq!(ctx.period.get(), 1_000_000);
    assert_eq!(driver.cycle_count(), 40);

    // Cycle 30 reports well after the retune, so its wake-to-wake interval
    // must track the halved period, not the original 2 ms spacing. Bounds
    // are generous: the absolute-time wait only ever overshoots.
    let report = driver.last_report().expect("a report after 30 cycles");
    assert_eq!(report.cycle, 30);
    assert!(
        report.actual_interval_ns < 1_800_000,
        "post-retune interval {} ns did not halve",
        report.actual_interval_ns
    );
    // Jitter is measured against the period each interval was scheduled
    // with; were the driver still pacing at 2 ms, every post-retune cycle
    // would carry ~1 ms of jitter and the window average would show it.
    assert!(
        report.avg_jitter_ns < 400_000,
        "average jitter {} ns suggests the schedule never retuned",
        report.avg_jitter_ns
    );

    // Output still strictly alternates across the retune.
    let edges = driver.gpio().edges();
    assert_eq!(edges.len(), 40);
    for window in edges.windows(2) {
        assert_ne!(window[0].1, window[1].1);
    }
}

#[test]
fn test_invalid_messages_leave_running_driver_untouched() {
    let config = fast_config(2_000_000);
    let ctx = Arc::new(PulseContext::new(config.period_ns));

    let (tx, endpoint) = MessageQueueEndpoint::pair();
    let control_ctx = Arc::clone(&ctx);
    let control = thread::spawn(move || {
        ControlChannel::new(endpoint, control_ctx).run();
    });

    tx.send(b"0".to_vec()).unwrap();
    tx.send(b"notanumber".to_vec()).unwrap();

    let mut driver =
        PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config).max_cycles(10);
    driver.init().unwrap();
    driver.run().unwrap();

    drop(tx);
    control.join().unwrap();

    // Neither bad message crashed the channel or changed the period.
    assert_eq!(ctx.period.get(), 2_000_000);
    assert_eq!(driver.cycle_count(), 10);
}

#[test]
fn test_shutdown_stops_both_activities() {
    let config = fast_config(1_000_000);
    let ctx = Arc::new(PulseContext::new(config.period_ns));

    let (tx, endpoint) = MessageQueueEndpoint::pair();
    let control_ctx = Arc::clone(&ctx);
    let control = thread::spawn(move || {
        ControlChannel::new(endpoint, control_ctx).run();
    });

    let stop_ctx = Arc::clone(&ctx);
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        stop_ctx.request_shutdown();
    });

    let mut driver = PulseDriver::new(SimulatedGpio::new(), Arc::clone(&ctx), &config);
    driver.init().unwrap();
    driver.run().unwrap(); // unbounded; returns on the shutdown request

    stopper.join().unwrap();
    drop(tx); // wake the control loop so it can observe shutdown
    control.join().unwrap();

    assert!(ctx.shutdown_requested());
    assert!(driver.cycle_count() > 0);
}
