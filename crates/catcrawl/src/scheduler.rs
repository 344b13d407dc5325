//! Fixed-interval driver for the scan cycle.

use crate::cancel::CancellationToken;
use crate::config::QueryErrorPolicy;
use crate::cycle::{CycleReport, ScanCycle};
use crate::error::{CrawlError, Result};
use crate::metrics::METRICS;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runs [`ScanCycle`]s back to back with a fixed pause in between.
///
/// Cycles never overlap: the pause starts only after the previous cycle has
/// returned. Cancellation is honored between cycles, during the pause, and
/// between datasets inside a cycle.
pub struct Scheduler {
    cycle: ScanCycle,
    interval: Duration,
    policy: QueryErrorPolicy,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(cycle: ScanCycle, interval: Duration, policy: QueryErrorPolicy) -> Self {
        Self {
            cycle,
            interval,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one wired to signal handlers.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run exactly one cycle.
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.cycle.run(&self.cancel).await
    }

    /// Run cycles until cancelled.
    ///
    /// Returns `Ok` on cancellation. A failed catalog query ends the loop with
    /// the error only under [`QueryErrorPolicy::Exit`].
    pub async fn start(&self) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            policy = ?self.policy,
            "Scheduler started"
        );

        while !self.cancel.is_cancelled() {
            match self.run_once().await {
                Ok(report) => {
                    debug!(found = report.found, linked = report.linked, "Cycle finished");
                }
                Err(err) => self.handle_cycle_error(err)?,
            }

            debug!(metrics = %METRICS.snapshot().summary(), "Crawler metrics");

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    fn handle_cycle_error(&self, err: CrawlError) -> Result<()> {
        match self.policy {
            QueryErrorPolicy::AbortCycle => {
                warn!(
                    error = %err,
                    retry_in_secs = self.interval.as_secs_f64(),
                    "Cycle aborted"
                );
                Ok(())
            }
            QueryErrorPolicy::Exit => {
                error!(error = %err, "Cycle failed, stopping scheduler");
                Err(err)
            }
        }
    }
}
