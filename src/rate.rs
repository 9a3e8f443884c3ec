//! Rate computation over the per-role observation stream.
//!
//! The `RateComputer` owns one `RoleState` per role and turns every new
//! observation into an `IntervalReport`. It is single-writer: the monitor
//! task owns it and nothing else reads the role states.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::histogram::HistogramBuckets;
use crate::report::{IntervalReport, ProcessObservation};
use crate::window::SampleWindow;

/// Default number of samples kept per role.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Cross-tick state for one role.
#[derive(Debug, Clone)]
pub struct RoleState {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_pid: u32,
    pub last_cpu_time_seconds: f64,
    pub times_restarted: u64,
    pub window: SampleWindow,
    pub lifetime_cpu_seconds: f64,
    pub lifetime_wall_seconds: f64,
    pub histogram: Vec<u64>,
}

impl RoleState {
    fn new(obs: &ProcessObservation, window_size: usize, buckets: usize) -> Self {
        Self {
            first_seen: obs.timestamp,
            last_seen: obs.timestamp,
            last_pid: obs.pid,
            last_cpu_time_seconds: obs.cpu_time_seconds,
            times_restarted: 0,
            window: SampleWindow::new(window_size),
            lifetime_cpu_seconds: 0.0,
            lifetime_wall_seconds: 0.0,
            histogram: vec![0; buckets],
        }
    }

    /// Starts over on a new process instance. First-seen, the restart
    /// counter and the histogram belong to the role and survive.
    fn restart(&mut self, obs: &ProcessObservation) {
        self.times_restarted += 1;
        self.window.clear();
        self.lifetime_cpu_seconds = 0.0;
        self.lifetime_wall_seconds = 0.0;
        self.rebaseline(obs);
    }

    fn rebaseline(&mut self, obs: &ProcessObservation) {
        self.last_seen = obs.timestamp;
        self.last_pid = obs.pid;
        self.last_cpu_time_seconds = obs.cpu_time_seconds;
    }

    fn lifetime_rate(&self) -> Option<f64> {
        if self.lifetime_wall_seconds > 0.0 {
            Some(self.lifetime_cpu_seconds / self.lifetime_wall_seconds)
        } else {
            None
        }
    }
}

/// Converts raw observations into interval reports, one role at a time.
pub struct RateComputer {
    window_size: usize,
    buckets: HistogramBuckets,
    roles: HashMap<String, RoleState>,
}

impl RateComputer {
    pub fn new(window_size: usize, buckets: HistogramBuckets) -> Self {
        Self {
            window_size: window_size.max(1),
            buckets,
            roles: HashMap::new(),
        }
    }

    /// Feeds one observation and returns the resulting report.
    ///
    /// Returns `None` when the observation does not advance time for its
    /// role (zero or negative delta); the role state is left unchanged.
    pub fn observe(&mut self, obs: &ProcessObservation) -> Option<IntervalReport> {
        let Some(state) = self.roles.get_mut(&obs.role) else {
            debug!("First observation for role {} (pid {})", obs.role, obs.pid);
            let state = RoleState::new(obs, self.window_size, self.buckets.len());
            let report = build_report(obs, &state, None, &self.buckets);
            self.roles.insert(obs.role.clone(), state);
            return Some(report);
        };

        if obs.pid != state.last_pid {
            info!(
                "Role {} restarted: pid {} -> {}",
                obs.role, state.last_pid, obs.pid
            );
            state.restart(obs);
            return Some(build_report(obs, state, None, &self.buckets));
        }

        let dt = match (obs.timestamp - state.last_seen).to_std() {
            Ok(d) if !d.is_zero() => d.as_secs_f64(),
            _ => {
                debug!(
                    "Ignoring observation for role {}: timestamp did not advance",
                    obs.role
                );
                return None;
            }
        };

        let dcpu = obs.cpu_time_seconds - state.last_cpu_time_seconds;
        if dcpu < 0.0 {
            info!(
                "Role {} CPU time went backwards ({:.3}s -> {:.3}s), treating pid {} as a new instance",
                obs.role, state.last_cpu_time_seconds, obs.cpu_time_seconds, obs.pid
            );
            state.restart(obs);
            return Some(build_report(obs, state, None, &self.buckets));
        }

        let current_rate = dcpu / dt;
        state.window.push(current_rate);
        state.lifetime_cpu_seconds += dcpu;
        state.lifetime_wall_seconds += dt;
        let bucket = self.buckets.index_for(current_rate);
        state.histogram[bucket] += 1;
        state.rebaseline(obs);

        Some(build_report(obs, state, Some(current_rate), &self.buckets))
    }

    /// Read-only view of a role's state.
    pub fn role_state(&self, role: &str) -> Option<&RoleState> {
        self.roles.get(role)
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn buckets(&self) -> &HistogramBuckets {
        &self.buckets
    }
}

fn build_report(
    obs: &ProcessObservation,
    state: &RoleState,
    current_rate: Option<f64>,
    buckets: &HistogramBuckets,
) -> IntervalReport {
    IntervalReport {
        role: obs.role.clone(),
        pid: obs.pid,
        first_seen: state.first_seen,
        last_seen: obs.timestamp,
        age: (obs.timestamp - state.first_seen)
            .to_std()
            .unwrap_or_default(),
        window_rate: state.window.mean(),
        standard_dev: state.window.stddev(),
        lifetime_rate: state.lifetime_rate(),
        current_rate,
        times_restarted: state.times_restarted,
        virtual_memory_bytes: obs.virtual_memory_bytes,
        rss_bytes: obs.rss_bytes,
        rate_histogram: buckets.to_map(&state.histogram),
    }
}
