//! Sampling loop.
//!
//! Every sampling interval the monitor asks its `ProcessSource` for fresh
//! observations, runs them through the `RateComputer` and sends the resulting
//! reports to the scheduler. Dropping the sender on exit is the scheduler's
//! end-of-stream signal.

use anyhow::Context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::health_stats::HealthStats;
use crate::process::ProcessSource;
use crate::rate::RateComputer;
use crate::report::{IntervalReport, ProcessObservation};

pub struct Monitor {
    source: Arc<dyn ProcessSource>,
    computer: RateComputer,
    expected_roles: Vec<String>,
    sample_interval: Duration,
    health: Arc<HealthStats>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn ProcessSource>,
        computer: RateComputer,
        expected_roles: Vec<String>,
        sample_interval: Duration,
        health: Arc<HealthStats>,
    ) -> Self {
        Self {
            source,
            computer,
            expected_roles,
            sample_interval,
            health,
        }
    }

    /// Runs until cancellation or until the scheduler hangs up.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        reports: mpsc::Sender<IntervalReport>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tick = interval(self.sample_interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Monitor started: {} roles, sampling every {:?}",
            self.expected_roles.len(),
            self.sample_interval
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Monitor cancelled");
                        return;
                    }
                }
                _ = tick.tick() => {
                    let observations = match self.sample_once().await {
                        Ok(o) => o,
                        Err(e) => {
                            error!("Sampling failed: {:#}", e);
                            continue;
                        }
                    };
                    for report in self.process(&observations) {
                        if reports.send(report).await.is_err() {
                            warn!("Report channel closed, stopping monitor");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Samples the source on the blocking pool.
    async fn sample_once(&self) -> anyhow::Result<Vec<ProcessObservation>> {
        let source = self.source.clone();
        let start = Instant::now();
        let observations = tokio::task::spawn_blocking(move || source.sample())
            .await
            .context("process sampling task failed")?;

        self.health
            .record_sample(observations.len() as u64, start.elapsed().as_secs_f64());
        debug!(
            "Sampled {} processes in {:.2}ms",
            observations.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(observations)
    }

    /// Feeds one sampling pass through the rate computer.
    pub fn process(&mut self, observations: &[ProcessObservation]) -> Vec<IntervalReport> {
        for role in &self.expected_roles {
            if !observations.iter().any(|o| &o.role == role) {
                debug!("No process found for role {}", role);
            }
        }

        observations
            .iter()
            .filter_map(|obs| self.computer.observe(obs))
            .collect()
    }
}
