//! Internal health statistics for the exporter.
//!
//! Tracks running current/average/max/min figures for sampling and flushing
//! so that `/health` can render them as a plain-text table.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min, count)
    fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Exporter self-observation shared by the monitor, scheduler and handlers.
pub struct HealthStats {
    observations_per_sample: Stat,
    sample_duration_seconds: Stat,
    flush_duration_seconds: Stat,
    total_samples: AtomicU64,
    total_reports: AtomicU64,
    flushes_ok: AtomicU64,
    flushes_failed: AtomicU64,
    last_flush_failed: AtomicBool,
    http_requests: AtomicU64,
    started: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            observations_per_sample: Stat::default(),
            sample_duration_seconds: Stat::default(),
            flush_duration_seconds: Stat::default(),
            total_samples: AtomicU64::new(0),
            total_reports: AtomicU64::new(0),
            flushes_ok: AtomicU64::new(0),
            flushes_failed: AtomicU64::new(0),
            last_flush_failed: AtomicBool::new(false),
            http_requests: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records one sampling pass of the process source.
    pub fn record_sample(&self, observations: u64, duration_seconds: f64) {
        self.observations_per_sample.add_sample(observations as f64);
        self.sample_duration_seconds.add_sample(duration_seconds);
        self.total_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a report received by the scheduler.
    pub fn record_report(&self) {
        self.total_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, duration_seconds: f64) {
        self.flush_duration_seconds.add_sample(duration_seconds);
        self.flushes_ok.fetch_add(1, Ordering::Relaxed);
        self.last_flush_failed.store(false, Ordering::Relaxed);
    }

    pub fn record_flush_failure(&self) {
        self.flushes_failed.fetch_add(1, Ordering::Relaxed);
        self.last_flush_failed.store(true, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn http_requests(&self) -> u64 {
        self.http_requests.load(Ordering::Relaxed)
    }

    pub fn last_flush_failed(&self) -> bool {
        self.last_flush_failed.load(Ordering::Relaxed)
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn total_reports(&self) -> u64 {
        self.total_reports.load(Ordering::Relaxed)
    }

    pub fn flushes_ok(&self) -> u64 {
        self.flushes_ok.load(Ordering::Relaxed)
    }

    pub fn flushes_failed(&self) -> u64 {
        self.flushes_failed.load(Ordering::Relaxed)
    }

    /// Last recorded flush duration, 0 before the first flush.
    pub fn last_flush_duration_seconds(&self) -> f64 {
        self.flush_duration_seconds.snapshot().0
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (ob_cur, ob_avg, ob_max, ob_min, _ob_count) = self.observations_per_sample.snapshot();
        let (sd_cur, sd_avg, sd_max, sd_min, _sd_count) = self.sample_duration_seconds.snapshot();
        let (fd_cur, fd_avg, fd_max, fd_min, _fd_count) = self.flush_duration_seconds.snapshot();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "observed roles",
            format!("{:.0}", ob_cur),
            format!("{:.1}", ob_avg),
            format!("{:.0}", ob_max),
            format!("{:.0}", ob_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "sample duration (s)",
            format!("{:.3}", sd_cur),
            format!("{:.3}", sd_avg),
            format!("{:.3}", sd_max),
            format!("{:.3}", sd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "flush duration (s)",
            format!("{:.3}", fd_cur),
            format!("{:.3}", fd_avg),
            format!("{:.3}", fd_max),
            format!("{:.3}", fd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "number of samples: {}", self.total_samples()).ok();
        writeln!(out, "reports received: {}", self.total_reports()).ok();
        writeln!(
            out,
            "flushes: {} ok, {} failed",
            self.flushes_ok(),
            self.flushes_failed()
        )
        .ok();
        writeln!(out, "http requests: {}", self.http_requests()).ok();
        writeln!(out, "uptime: {}s", self.uptime_seconds()).ok();

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut s = RunningStat::default();
        assert_eq!(s.avg(), 0.0);
        s.add(2.0);
        s.add(6.0);
        s.add(4.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 6.0);
        assert_eq!(s.last, 4.0);
        assert_eq!(s.avg(), 4.0);
    }

    #[test]
    fn test_flush_failure_is_cleared_by_success() {
        let stats = HealthStats::new();
        stats.record_flush_failure();
        assert!(stats.last_flush_failed());
        stats.record_flush(0.002);
        assert!(!stats.last_flush_failed());
        assert_eq!(stats.flushes_ok(), 1);
        assert_eq!(stats.flushes_failed(), 1);
        assert_eq!(stats.last_flush_duration_seconds(), 0.002);
    }

    #[test]
    fn test_render_table() {
        let stats = HealthStats::new();
        stats.record_sample(3, 0.01);
        stats.record_sample(4, 0.03);
        let table = stats.render_table();
        assert!(table.contains("observed roles"));
        assert!(table.contains("number of samples: 2"));
        assert!(table.contains("flushes: 0 ok, 0 failed"));
    }
}
