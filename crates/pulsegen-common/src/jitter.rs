//! Per-cycle jitter accumulation and fixed-cadence reporting.
//!
//! Keeps a running sum and lifetime maximum only, so memory use is constant
//! no matter how long the generator runs. Reports are produced every
//! `report_every` cycles and the running accumulators reset afterwards.

/// Timing observation for a single cycle. Created once per cycle and consumed
/// immediately; never retained.
#[derive(Debug, Clone, Copy)]
pub struct CycleSample {
    /// Period the cycle was scheduled with, in nanoseconds.
    pub requested_period_ns: u64,
    /// Measured time between this wake and the previous one, in nanoseconds.
    pub actual_interval_ns: u64,
}

impl CycleSample {
    /// Absolute deviation of the actual interval from the requested period.
    #[must_use]
    pub fn jitter_ns(&self) -> u64 {
        self.actual_interval_ns.abs_diff(self.requested_period_ns)
    }
}

/// Running jitter statistics.
#[derive(Debug)]
pub struct JitterStats {
    /// Report cadence in cycles. Derived once at startup and never
    /// recomputed, even when the period changes at runtime.
    report_every: u64,
    /// Sum of jitter since the last report.
    running_sum_ns: u64,
    /// Samples accumulated since the last report.
    samples_since_report: u64,
    /// Lifetime maximum jitter; monotonically non-decreasing.
    max_jitter_ns: u64,
}

/// Snapshot emitted on each report cadence.
#[derive(Debug, Clone, Copy)]
pub struct JitterReport {
    /// Cycle index the report was produced at.
    pub cycle: u64,
    /// Wall-clock seconds at the reporting wake.
    pub sec: i64,
    /// Wall-clock nanoseconds at the reporting wake.
    pub nsec: i64,
    /// Actual interval of the reporting cycle in nanoseconds.
    pub actual_interval_ns: u64,
    /// Jitter of the reporting cycle in nanoseconds.
    pub jitter_ns: u64,
    /// Average jitter over the report window in nanoseconds.
    pub avg_jitter_ns: u64,
    /// Lifetime maximum jitter in nanoseconds.
    pub max_jitter_ns: u64,
}

impl JitterStats {
    /// Create statistics with the given report cadence (clamped to >= 1).
    #[must_use]
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
            running_sum_ns: 0,
            samples_since_report: 0,
            max_jitter_ns: 0,
        }
    }

    /// Report cadence in cycles.
    #[must_use]
    pub fn report_every(&self) -> u64 {
        self.report_every
    }

    /// Lifetime maximum jitter observed so far.
    #[must_use]
    pub fn max_jitter_ns(&self) -> u64 {
        self.max_jitter_ns
    }

    /// Samples accumulated since the last report.
    #[must_use]
    pub fn samples_since_report(&self) -> u64 {
        self.samples_since_report
    }

    /// Record one cycle's sample, returning its jitter.
    ///
    /// The very first cycle (index 0) is excluded from both the average and
    /// the lifetime maximum: startup timing is not representative.
    pub fn record(&mut self, sample: &CycleSample, cycle_index: u64) -> u64 {
        let jitter = sample.jitter_ns();
        if cycle_index == 0 {
            return jitter;
        }

        self.running_sum_ns = self.running_sum_ns.saturating_add(jitter);
        self.samples_since_report += 1;
        self.max_jitter_ns = self.max_jitter_ns.max(jitter);
        jitter
    }

    /// Produce a report when `cycle_index` is a positive multiple of the
    /// cadence, resetting the running accumulators afterwards.
    pub fn maybe_report(
        &mut self,
        cycle_index: u64,
        sec: i64,
        nsec: i64,
        actual_interval_ns: u64,
        jitter_ns: u64,
    ) -> Option<JitterReport> {
        if cycle_index == 0 || cycle_index % self.report_every != 0 {
            return None;
        }

        let report = JitterReport {
            cycle: cycle_index,
            sec,
            nsec,
            actual_interval_ns,
            jitter_ns,
            avg_jitter_ns: self.running_sum_ns / self.report_every,
            max_jitter_ns: self.max_jitter_ns,
        };

        self.running_sum_ns = 0;
        self.samples_since_report = 0;

        Some(report)
    }
}
