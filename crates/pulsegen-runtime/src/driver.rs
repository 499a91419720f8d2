//! Periodic output driver.
//!
//! The driver toggles one GPIO line on an absolute-time schedule:
//! 1. Block until the next absolute deadline
//! 2. Toggle the output from cycle-counter parity
//! 3. Advance the deadline by the current period
//! 4. Measure the wake-to-wake interval and feed the jitter statistics
//!
//! Deadlines are absolute (`clock_nanosleep` with `TIMER_ABSTIME`), not
//! relative sleeps: a relative sleep would accumulate every cycle's wake
//! processing latency as long-term drift.

use crate::context::PulseContext;
use pulsegen_common::{
    CycleSample, JitterReport, JitterStats, PulseConfig, PulseError, PulseResult, NSEC_PER_SEC,
};
use pulsegen_gpio::GpioOutput;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Read the realtime clock.
fn now() -> PulseResult<libc::timespec> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid out-pointer for clock_gettime.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(PulseError::WaitFailed { errno });
    }
    Ok(ts)
}

/// Flatten a timespec to nanoseconds.
fn ts_to_ns(ts: &libc::timespec) -> u64 {
    (ts.tv_sec as u64) * NSEC_PER_SEC + (ts.tv_nsec as u64)
}

/// Advance a deadline by `delta_ns`, normalizing nanosecond overflow into
/// the seconds field.
///
/// The intermediate sum is widened to i128: any u64 delta must move the
/// deadline forward, never wrap it backwards.
fn advance(deadline: &mut libc::timespec, delta_ns: u64) {
    let total = i128::from(deadline.tv_nsec) + i128::from(delta_ns);
    deadline.tv_sec += (total / i128::from(NSEC_PER_SEC)) as libc::time_t;
    deadline.tv_nsec = (total % i128::from(NSEC_PER_SEC)) as _;
}

/// Block until the absolute deadline.
///
/// EINTR is retried (the deadline is absolute, so retrying cannot drift);
/// any other failure is fatal because the timing guarantee is gone.
#[cfg(target_os = "linux")]
fn wait_until(deadline: &libc::timespec) -> PulseResult<()> {
    loop {
        // SAFETY: deadline is a valid timespec for the life of the call.
        let rc = unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_REALTIME,
                libc::TIMER_ABSTIME,
                deadline,
                std::ptr::null_mut(),
            )
        };
        match rc {
            0 => return Ok(()),
            libc::EINTR => continue,
            errno => return Err(PulseError::WaitFailed { errno }),
        }
    }
}

/// Portable fallback: sleep the remaining duration. Loses the absolute-time
/// property but keeps the driver testable off-target.
#[cfg(not(target_os = "linux"))]
fn wait_until(deadline: &libc::timespec) -> PulseResult<()> {
    let current = now()?;
    let deadline_ns = ts_to_ns(deadline);
    let now_ns = ts_to_ns(&current);
    if deadline_ns > now_ns {
        std::thread::sleep(Duration::from_nanos(deadline_ns - now_ns));
    }
    Ok(())
}

/// Periodic output driver.
///
/// Owns the GPIO line and the schedule; shares only the period cell and the
/// shutdown flag with the control channel, through [`PulseContext`].
pub struct PulseDriver<G: GpioOutput> {
    gpio: G,
    pin: u32,
    ctx: Arc<PulseContext>,
    stats: JitterStats,
    settle_time: Duration,
    /// Stop after this many cycles; 0 means run until shutdown.
    max_cycles: u64,
    cycle_count: u64,
    last_report: Option<JitterReport>,
}

impl<G: GpioOutput> PulseDriver<G> {
    /// Create a driver for the configured pin.
    pub fn new(gpio: G, ctx: Arc<PulseContext>, config: &PulseConfig) -> Self {
        Self {
            gpio,
            pin: config.gpio_pin,
            ctx,
            stats: JitterStats::new(config.report_every()),
            settle_time: config.settle_time,
            max_cycles: 0,
            cycle_count: 0,
            last_report: None,
        }
    }

    /// Bound the run to `n` cycles (0 = unbounded). Used by tests and the
    /// `--max-cycles` flag.
    #[must_use]
    pub fn max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = n;
        self
    }

    /// Configure the output pin. Must be called before [`run`](Self::run).
    pub fn init(&mut self) -> PulseResult<()> {
        self.gpio.configure_as_output(self.pin)?;
        debug!(pin = self.pin, "output pin configured");
        Ok(())
    }

    /// Total cycles executed.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Jitter statistics.
    #[must_use]
    pub fn stats(&self) -> &JitterStats {
        &self.stats
    }

    /// The most recent timing report, if one was emitted.
    #[must_use]
    pub fn last_report(&self) -> Option<JitterReport> {
        self.last_report
    }

    /// The GPIO output (test inspection).
    #[must_use]
    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Run the toggle loop until shutdown is requested, the cycle bound is
    /// reached, or the wait primitive fails.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::WaitFailed`] if the absolute-time wait fails
    /// with anything other than EINTR. Callers must treat this as fatal.
    pub fn run(&mut self) -> PulseResult<()> {
        // First deadline lands one settle interval from now, before the
        // periodic cadence takes over.
        let mut deadline = now()?;
        advance(&mut deadline, self.settle_time.as_nanos() as u64);

        info!(
            pin = self.pin,
            period_ns = self.ctx.period.get(),
            report_every = self.stats.report_every(),
            "output driver entering toggle loop"
        );

        let mut prev_wake_ns: u64 = 0;
        // Period the in-flight interval was scheduled with.
        let mut prev_period_ns = self.ctx.period.get();

        while !self.ctx.shutdown_requested() {
            wait_until(&deadline)?;

            if self.cycle_count % 2 == 1 {
                self.gpio.set(self.pin);
            } else {
                self.gpio.clear(self.pin);
            }

            // One consistent read per cycle; the control channel may retune
            // the cell at any time.
            let period_ns = self.ctx.period.get();
            advance(&mut deadline, period_ns);

            let wake = now()?;
            let wake_ns = ts_to_ns(&wake);
            let sample = CycleSample {
                requested_period_ns: prev_period_ns,
                actual_interval_ns: wake_ns.saturating_sub(prev_wake_ns),
            };
            let jitter_ns = self.stats.record(&sample, self.cycle_count);

            if let Some(report) = self.stats.maybe_report(
                self.cycle_count,
                wake.tv_sec as i64,
                wake.tv_nsec as i64,
                sample.actual_interval_ns,
                jitter_ns,
            ) {
                info!(
                    cycle = report.cycle,
                    sec = report.sec,
                    nsec = report.nsec,
                    delta_ns = report.actual_interval_ns,
                    jitter_ns = report.jitter_ns,
                    avg_ns = report.avg_jitter_ns,
                    max_ns = report.max_jitter_ns,
                    "timing report"
                );
                self.last_report = Some(report);
            }

            prev_wake_ns = wake_ns;
            prev_period_ns = period_ns;
            self.cycle_count += 1;

            if self.max_cycles > 0 && self.cycle_count >= self.max_cycles {
                debug!(cycles = self.cycle_count, "cycle bound reached");
                break;
            }
        }

        info!(cycles = self.cycle_count, "output driver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsegen_gpio::SimulatedGpio;

    fn fast_config(period_ns: u64) -> PulseConfig {
        PulseConfig {
            period_ns,
            settle_time: Duration::from_millis(2),
            ..PulseConfig::default()
        }
    }

    #[test]
    fn test_advance_normalizes_overflow() {
        let mut ts = libc::timespec {
            tv_sec: 10,
            tv_nsec: 900_000_000,
        };
        advance(&mut ts, 250_000_000);
        assert_eq!(ts.tv_sec, 11);
        assert_eq!(ts.tv_nsec, 150_000_000);
    }

    #[test]
    fn test_advance_multiple_seconds() {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 500_000_000,
        };
        advance(&mut ts, 3_700_000_000);
        assert_eq!(ts.tv_sec, 4);
        assert_eq!(ts.tv_nsec, 200_000_000);
    }

    #[test]
    fn test_advance_never_moves_deadline_backwards() {
        // Deltas above i64::MAX ns must still advance the deadline.
        let mut ts = libc::timespec {
            tv_sec: 10,
            tv_nsec: 500_000_000,
        };
        advance(&mut ts, 10_000_000_000_000_000_000); // 1e19 ns = 1e10 s
        assert_eq!(ts.tv_sec, 10_000_000_010);
        assert_eq!(ts.tv_nsec, 500_000_000);

        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 999_999_999,
        };
        advance(&mut ts, u64::MAX);
        assert!(ts.tv_sec > 0);
        assert!((0..1_000_000_000).contains(&ts.tv_nsec));
    }

    #[test]
    fn test_output_alternates_strictly() {
        let config = fast_config(1_000_000);
        let ctx = Arc::new(PulseContext::new(config.period_ns));
        let mut driver = PulseDriver::new(SimulatedGpio::new(), ctx, &config).max_cycles(6);

        driver.init().unwrap();
        driver.run().unwrap();

        assert_eq!(driver.cycle_count(), 6);
        let edges = driver.gpio().edges();
        assert_eq!(edges.len(), 6);
        // Even cycles clear, odd cycles set; every edge complements the last.
        for (i, (pin, level)) in edges.iter().enumerate() {
            assert_eq!(*pin, 4);
            assert_eq!(*level, i % 2 == 1);
        }
    }

    #[test]
    fn test_first_cycle_excluded_from_stats() {
        let config = fast_config(1_000_000);
        let ctx = Arc::new(PulseContext::new(config.period_ns));
        let mut driver = PulseDriver::new(SimulatedGpio::new(), ctx, &config).max_cycles(5);

        driver.init().unwrap();
        driver.run().unwrap();

        // 5 cycles ran, but cycle 0 is never recorded.
        assert_eq!(driver.stats().samples_since_report(), 4);
    }

    #[test]
    fn test_shutdown_before_start() {
        let config = fast_config(1_000_000);
        let ctx = Arc::new(PulseContext::new(config.period_ns));
        ctx.request_shutdown();

        let mut driver = PulseDriver::new(SimulatedGpio::new(), ctx, &config);
        driver.init().unwrap();
        driver.run().unwrap();

        assert_eq!(driver.cycle_count(), 0);
        assert!(driver.gpio().edges().is_empty());
    }
}
