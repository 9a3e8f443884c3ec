//! Reporting scheduler.
//!
//! Bridges the rate computer's output to the report store and flushes the
//! store to an output sink on a fixed period. The loop waits on whichever of
//! {new report, flush tick, cancellation} is ready first.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::health_stats::HealthStats;
use crate::report::IntervalReport;
use crate::sink::ReportSink;
use crate::store::{ReportStore, StoreError};

/// Serialization used for periodic flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Text,
}

/// Where and how the scheduler flushes the store.
pub struct FlushTarget {
    pub format: OutputFormat,
    pub metric_prefix: String,
    pub sink: Box<dyn ReportSink>,
}

/// Why the scheduler loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// All report senders were dropped.
    EndOfStream,
    /// The shared cancellation signal fired.
    Cancelled,
}

pub struct ReportScheduler {
    store: Arc<ReportStore>,
    health: Arc<HealthStats>,
    report_interval: Duration,
    target: Option<FlushTarget>,
}

impl ReportScheduler {
    pub fn new(
        store: Arc<ReportStore>,
        health: Arc<HealthStats>,
        report_interval: Duration,
        target: Option<FlushTarget>,
    ) -> Self {
        Self {
            store,
            health,
            report_interval,
            target,
        }
    }

    /// Runs until the report channel closes or cancellation is signalled.
    ///
    /// On cancellation, reports already queued in the channel are drained
    /// into the store before returning.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut reports: mpsc::Receiver<IntervalReport>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SchedulerExit {
        let period = self.report_interval.max(Duration::from_millis(1));
        let mut tick = interval_at(tokio::time::Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Reporting scheduler started with {:?} flush interval", period);

        if *shutdown.borrow() {
            self.drain(&mut reports);
            return SchedulerExit::Cancelled;
        }

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.drain(&mut reports);
                        info!("Reporting scheduler cancelled");
                        return SchedulerExit::Cancelled;
                    }
                }
                received = reports.recv() => {
                    match received {
                        Some(report) => self.accept(report),
                        None => {
                            info!("Report stream closed, stopping scheduler");
                            return SchedulerExit::EndOfStream;
                        }
                    }
                }
                _ = tick.tick() => self.flush(),
            }
        }
    }

    fn accept(&self, report: IntervalReport) {
        debug!("Storing report for role {} (pid {})", report.role, report.pid);
        self.health.record_report();
        self.store.insert(report);
    }

    fn drain(&self, reports: &mut mpsc::Receiver<IntervalReport>) {
        let mut drained = 0usize;
        while let Ok(report) = reports.try_recv() {
            self.accept(report);
            drained += 1;
        }
        if drained > 0 {
            debug!("Drained {} queued reports on shutdown", drained);
        }
    }

    /// Serializes the store and hands it to the sink. Failures are logged
    /// and the tick is skipped; the store is left untouched.
    fn flush(&mut self) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        if self.store.is_empty() {
            debug!("Store empty, skipping flush");
            return;
        }

        let start = Instant::now();
        let payload: Result<Vec<u8>, StoreError> = match target.format {
            OutputFormat::Json => self.store.to_json(),
            OutputFormat::Text => Ok(self.store.to_text(&target.metric_prefix).into_bytes()),
        };

        let payload = match payload {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to produce report: {}", e);
                self.health.record_flush_failure();
                return;
            }
        };

        if let Err(e) = target.sink.publish(&payload) {
            warn!("Failed to publish report: {}", e);
            self.health.record_flush_failure();
            return;
        }

        self.health.record_flush(start.elapsed().as_secs_f64());
        debug!(
            "Flushed {} roles ({} bytes) in {:.3}ms",
            self.store.len(),
            payload.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }
}
