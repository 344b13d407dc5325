//! In-process crawler counters.
//!
//! Bumped by the scan cycle and the relink command; the scheduler logs a
//! one-line summary after every cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

/// Monotonic relaxed counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub cycles_run: Counter,
    /// Cycles cut short by a failed catalog query
    pub cycles_aborted: Counter,

    pub datasets_found: Counter,
    /// Datasets whose file was hashed, whatever happened afterwards
    pub datasets_scanned: Counter,
    pub datasets_linked: Counter,
    /// No location at the watch site
    pub datasets_skipped: Counter,
    pub datasets_relinked: Counter,

    pub scan_failures: Counter,
    pub phase1_failures: Counter,
    pub store_failures: Counter,
    pub phase2_failures: Counter,

    cycle_micros: Counter,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_run: Counter::new(),
            cycles_aborted: Counter::new(),
            datasets_found: Counter::new(),
            datasets_scanned: Counter::new(),
            datasets_linked: Counter::new(),
            datasets_skipped: Counter::new(),
            datasets_relinked: Counter::new(),
            scan_failures: Counter::new(),
            phase1_failures: Counter::new(),
            store_failures: Counter::new(),
            phase2_failures: Counter::new(),
            cycle_micros: Counter::new(),
        }
    }

    /// Add the time elapsed since `started` to the cumulative cycle time.
    pub fn record_cycle_time(&self, started: Instant) {
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.cycle_micros.add(micros);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_run: self.cycles_run.get(),
            cycles_aborted: self.cycles_aborted.get(),
            datasets_found: self.datasets_found.get(),
            datasets_scanned: self.datasets_scanned.get(),
            datasets_linked: self.datasets_linked.get(),
            datasets_skipped: self.datasets_skipped.get(),
            datasets_relinked: self.datasets_relinked.get(),
            scan_failures: self.scan_failures.get(),
            phase1_failures: self.phase1_failures.get(),
            store_failures: self.store_failures.get(),
            phase2_failures: self.phase2_failures.get(),
            cycle_micros: self.cycle_micros.get(),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub cycles_run: u64,
    pub cycles_aborted: u64,
    pub datasets_found: u64,
    pub datasets_scanned: u64,
    pub datasets_linked: u64,
    pub datasets_skipped: u64,
    pub datasets_relinked: u64,
    pub scan_failures: u64,
    pub phase1_failures: u64,
    pub store_failures: u64,
    pub phase2_failures: u64,
    pub cycle_micros: u64,
}

impl MetricsSnapshot {
    /// Failures that left the catalog and the store out of step.
    pub fn inconsistent(&self) -> u64 {
        self.store_failures + self.phase2_failures
    }

    pub fn mean_cycle_ms(&self) -> f64 {
        match self.cycles_run {
            0 => 0.0,
            n => self.cycle_micros as f64 / n as f64 / 1000.0,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "cycles={} aborted={} found={} scanned={} linked={} skipped={} relinked={} \
             scan_failures={} phase1_failures={} inconsistent={} mean_cycle_ms={:.2}",
            self.cycles_run,
            self.cycles_aborted,
            self.datasets_found,
            self.datasets_scanned,
            self.datasets_linked,
            self.datasets_skipped,
            self.datasets_relinked,
            self.scan_failures,
            self.phase1_failures,
            self.inconsistent(),
            self.mean_cycle_ms(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_feed_snapshot() {
        let metrics = Metrics::new();
        metrics.cycles_run.inc();
        metrics.cycles_run.inc();
        metrics.datasets_found.add(3);
        metrics.store_failures.inc();
        metrics.phase2_failures.inc();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles_run, 2);
        assert_eq!(snapshot.datasets_found, 3);
        assert_eq!(snapshot.inconsistent(), 2);
    }

    #[test]
    fn test_mean_cycle_time() {
        assert_eq!(MetricsSnapshot::default().mean_cycle_ms(), 0.0);
        let snapshot = MetricsSnapshot {
            cycles_run: 2,
            cycle_micros: 3000,
            ..Default::default()
        };
        assert_eq!(snapshot.mean_cycle_ms(), 1.5);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let snapshot = MetricsSnapshot {
            cycles_run: 4,
            datasets_linked: 7,
            ..Default::default()
        };
        let summary = snapshot.summary();
        assert!(summary.contains("cycles=4"));
        assert!(summary.contains("linked=7"));
    }
}
