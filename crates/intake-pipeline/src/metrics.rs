//! Timing and throughput metrics
//!
//! Every division is guarded, so the computed values are always finite.

use chrono::{DateTime, Utc};

use crate::types::{ProcessingSummary, TimingMetrics};

/// Transactions value used when a summary reports none
pub const MISSING_TRANSACTIONS_SENTINEL: f64 = -1.0;

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Derives [`TimingMetrics`] from a start time and a summary
pub trait MetricsComputer: Send + Sync {
    fn compute(&self, start_time: DateTime<Utc>, summary: &ProcessingSummary) -> TimingMetrics;

    /// Current time according to the computer's clock
    fn now(&self) -> DateTime<Utc>;
}

/// Metrics computed against an injectable clock
pub struct StandardMetrics<C: Clock = SystemClock> {
    clock: C,
}

impl StandardMetrics<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl Default for StandardMetrics<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> StandardMetrics<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> MetricsComputer for StandardMetrics<C> {
    fn compute(&self, start_time: DateTime<Utc>, summary: &ProcessingSummary) -> TimingMetrics {
        compute_between(start_time, self.clock.now(), summary)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Pure metric derivation
///
/// Negative elapsed time (clock skew) is clamped to zero. A summary with no
/// transactions, or zero of them, uses [`MISSING_TRANSACTIONS_SENTINEL`].
pub fn compute_between(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    summary: &ProcessingSummary,
) -> TimingMetrics {
    let elapsed_millis = (end_time - start_time).num_milliseconds().max(0);
    let elapsed_secs = elapsed_millis as f64 / 1000.0;

    let totals = &summary.totals;
    let valid_record_percent =
        totals.records_ok as f64 / totals.raw_lines.max(1) as f64 * 100.0;

    let transactions = match totals.transactions {
        Some(n) if n > 0 => n as f64,
        _ => MISSING_TRANSACTIONS_SENTINEL,
    };
    let divisor = if elapsed_secs == 0.0 { 1.0 } else { elapsed_secs };
    let throughput_per_sec = transactions / divisor;

    TimingMetrics {
        start_time,
        end_time,
        elapsed_millis,
        elapsed_secs,
        valid_record_percent,
        throughput_per_sec,
    }
}
