//! Prometheus metrics definitions.
//!
//! Per-role gauges mirror the fields of the latest `IntervalReport` for each
//! role; exporter gauges describe the exporter itself.

use prometheus::{Gauge, GaugeVec, Opts, Registry};

use crate::health_stats::HealthStats;
use crate::report::IntervalReport;

/// Per-role gauges, all labelled by `role`.
#[derive(Clone)]
pub struct RoleMetrics {
    pub pid: GaugeVec,
    pub start_time: GaugeVec,
    pub age: GaugeVec,
    pub virtual_memory: GaugeVec,
    pub rss: GaugeVec,

    // CPU rates, skipped while undefined
    pub window_rate: GaugeVec,
    pub standard_dev: GaugeVec,
    pub lifetime_rate: GaugeVec,
    pub current_rate: GaugeVec,

    pub restarts: GaugeVec,
    /// Interval counts per rate bucket, labelled by `role` and `bucket`.
    pub rate_histogram: GaugeVec,
}

impl RoleMetrics {
    /// Creates and registers all per-role metrics with the registry.
    pub fn new(registry: &Registry, prefix: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let labels = &["role"];
        let gauge = |name: &str, help: &str| {
            GaugeVec::new(Opts::new(format!("{prefix}_{name}"), help), labels)
        };

        let pid = gauge("pid", "PID of the process currently filling the role")?;
        let start_time = gauge(
            "process_start_seconds",
            "Unix time the role's process was first observed",
        )?;
        let age = gauge(
            "process_age_seconds",
            "Time between first and last observation of the role",
        )?;
        let virtual_memory = gauge(
            "virtual_memory_bytes",
            "Virtual memory size of the role's process",
        )?;
        let rss = gauge("rss_bytes", "Resident set size of the role's process")?;
        let window_rate = gauge(
            "cpu_rate_window",
            "Mean CPU rate over the sliding sample window (1.0 = one core)",
        )?;
        let standard_dev = gauge(
            "cpu_rate_stddev",
            "Standard deviation of the CPU rate over the sliding sample window",
        )?;
        let lifetime_rate = gauge(
            "cpu_rate_lifetime",
            "CPU rate since the role's process was first observed",
        )?;
        let current_rate = gauge(
            "cpu_rate_current",
            "CPU rate over the most recent sampling interval",
        )?;
        let restarts = gauge(
            "restarts_total",
            "Times the role's process was replaced since the exporter started",
        )?;
        let rate_histogram = GaugeVec::new(
            Opts::new(
                format!("{prefix}_cpu_rate_histogram_intervals"),
                "Number of sampling intervals whose CPU rate fell into each bucket",
            ),
            &["role", "bucket"],
        )?;

        registry.register(Box::new(pid.clone()))?;
        registry.register(Box::new(start_time.clone()))?;
        registry.register(Box::new(age.clone()))?;
        registry.register(Box::new(virtual_memory.clone()))?;
        registry.register(Box::new(rss.clone()))?;
        registry.register(Box::new(window_rate.clone()))?;
        registry.register(Box::new(standard_dev.clone()))?;
        registry.register(Box::new(lifetime_rate.clone()))?;
        registry.register(Box::new(current_rate.clone()))?;
        registry.register(Box::new(restarts.clone()))?;
        registry.register(Box::new(rate_histogram.clone()))?;

        Ok(Self {
            pid,
            start_time,
            age,
            virtual_memory,
            rss,
            window_rate,
            standard_dev,
            lifetime_rate,
            current_rate,
            restarts,
            rate_histogram,
        })
    }

    /// Resets all metrics (used before updating with fresh data).
    pub fn reset(&self) {
        self.pid.reset();
        self.start_time.reset();
        self.age.reset();
        self.virtual_memory.reset();
        self.rss.reset();
        self.window_rate.reset();
        self.standard_dev.reset();
        self.lifetime_rate.reset();
        self.current_rate.reset();
        self.restarts.reset();
        self.rate_histogram.reset();
    }

    /// Sets metric values from one role's latest report.
    pub fn set_for_report(&self, report: &IntervalReport) {
        let labels = &[report.role.as_str()];

        self.pid.with_label_values(labels).set(report.pid as f64);
        self.start_time
            .with_label_values(labels)
            .set(report.first_seen.timestamp() as f64);
        self.age
            .with_label_values(labels)
            .set(report.age.as_secs_f64());
        self.virtual_memory
            .with_label_values(labels)
            .set(report.virtual_memory_bytes as f64);
        self.rss
            .with_label_values(labels)
            .set(report.rss_bytes as f64);
        self.restarts
            .with_label_values(labels)
            .set(report.times_restarted as f64);

        let rates = [
            (&self.window_rate, report.window_rate),
            (&self.standard_dev, report.standard_dev),
            (&self.lifetime_rate, report.lifetime_rate),
            (&self.current_rate, report.current_rate),
        ];
        for (gauge, rate) in rates {
            if let Some(v) = rate.filter(|v| v.is_finite()) {
                gauge.with_label_values(labels).set(v);
            }
        }

        for (bucket, count) in &report.rate_histogram {
            self.rate_histogram
                .with_label_values(&[report.role.as_str(), bucket.as_str()])
                .set(*count as f64);
        }
    }
}

/// Gauges describing the exporter itself.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub roles_total: Gauge,
    pub scrape_duration: Gauge,
    pub last_flush_success: Gauge,
    pub flush_duration: Gauge,
}

impl ExporterMetrics {
    pub fn new(registry: &Registry, prefix: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let roles_total = Gauge::new(
            format!("{prefix}_exporter_roles_total"),
            "Number of roles with a report in the store",
        )?;
        let scrape_duration = Gauge::new(
            format!("{prefix}_exporter_scrape_duration_seconds"),
            "Time spent rendering the last /metrics response",
        )?;
        let last_flush_success = Gauge::new(
            format!("{prefix}_exporter_last_flush_success"),
            "1 if the last periodic flush succeeded, 0 otherwise",
        )?;
        let flush_duration = Gauge::new(
            format!("{prefix}_exporter_flush_duration_seconds"),
            "Duration of the last successful periodic flush",
        )?;

        registry.register(Box::new(roles_total.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(last_flush_success.clone()))?;
        registry.register(Box::new(flush_duration.clone()))?;

        Ok(Self {
            roles_total,
            scrape_duration,
            last_flush_success,
            flush_duration,
        })
    }

    /// Copies the scheduler's flush state out of the health statistics.
    pub fn update_from_health(&self, health: &HealthStats) {
        self.last_flush_success
            .set(if health.last_flush_failed() { 0.0 } else { 1.0 });
        self.flush_duration
            .set(health.last_flush_duration_seconds());
    }
}
