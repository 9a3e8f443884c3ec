//! Observation and report types.
//!
//! `ProcessObservation` is the raw input produced by a process source,
//! `IntervalReport` the immutable per-role snapshot produced by the rate
//! computer. `WireReport` is the sanitized copy used for serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::time::Duration;

/// Wire value used for rates that are undefined or not finite.
pub const UNDEFINED_RATE: f64 = -1.0;

/// Default metric name prefix for the text exposition format.
pub const DEFAULT_METRIC_PREFIX: &str = "procrate";

/// A single raw reading of one process, keyed by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessObservation {
    pub role: String,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    /// Cumulative user + system CPU time in seconds.
    pub cpu_time_seconds: f64,
    pub virtual_memory_bytes: u64,
    pub rss_bytes: u64,
}

/// Point-in-time view of a role's CPU usage.
///
/// - `window_rate`: mean of the last N current rates; smoothed.
/// - `standard_dev`: population standard deviation of that window.
/// - `lifetime_rate`: CPU time over wall time since first seen (or since the
///   last restart); least volatile.
/// - `current_rate`: derivative between the last two samples; most volatile.
///
/// Rates are `None` until enough history exists to compute them.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalReport {
    pub role: String,
    pub pid: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub age: Duration,
    pub window_rate: Option<f64>,
    pub standard_dev: Option<f64>,
    pub lifetime_rate: Option<f64>,
    pub current_rate: Option<f64>,
    pub times_restarted: u64,
    pub virtual_memory_bytes: u64,
    pub rss_bytes: u64,
    pub rate_histogram: BTreeMap<String, u64>,
}

impl IntervalReport {
    /// Builds the sanitized serialization copy of this report.
    pub fn to_wire(&self) -> WireReport {
        WireReport {
            pid: self.pid,
            role: self.role.clone(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            age: u64::try_from(self.age.as_nanos()).unwrap_or(u64::MAX),
            window_rate: sanitize_rate(self.window_rate),
            standard_dev: sanitize_rate(self.standard_dev),
            lifetime_rate: sanitize_rate(self.lifetime_rate),
            current_rate: sanitize_rate(self.current_rate),
            times_restarted: self.times_restarted,
            virtual_memory_bytes: self.virtual_memory_bytes,
            rss_bytes: self.rss_bytes,
            rate_histogram: self.rate_histogram.clone(),
        }
    }

    /// Renders the four-line text exposition block for this role.
    pub fn to_exposition(&self, prefix: &str) -> String {
        let role = escape_label_value(&self.role);
        let mut out = String::new();
        writeln!(out, "{prefix}_pid{{role=\"{role}\"}} {}", self.pid).ok();
        writeln!(
            out,
            "{prefix}_process_start_seconds{{role=\"{role}\"}} {}",
            self.first_seen.timestamp()
        )
        .ok();
        writeln!(
            out,
            "{prefix}_process_age_seconds{{role=\"{role}\"}} {}",
            self.age.as_secs()
        )
        .ok();
        writeln!(
            out,
            "{prefix}_virtual_memory_bytes{{role=\"{role}\"}} {}",
            self.virtual_memory_bytes
        )
        .ok();
        out
    }
}

impl std::fmt::Display for IntervalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_exposition(DEFAULT_METRIC_PREFIX))
    }
}

/// Serialization form of an `IntervalReport`.
///
/// Every rate is a finite number; undefined values carry `UNDEFINED_RATE`.
/// `age` is expressed in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReport {
    pub pid: u32,
    pub role: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub age: u64,
    pub window_rate: f64,
    pub standard_dev: f64,
    pub lifetime_rate: f64,
    pub current_rate: f64,
    pub times_restarted: u64,
    pub virtual_memory_bytes: u64,
    pub rss_bytes: u64,
    pub rate_histogram: BTreeMap<String, u64>,
}

/// Maps undefined, NaN and infinite rates onto `UNDEFINED_RATE`.
pub fn sanitize_rate(rate: Option<f64>) -> f64 {
    match rate {
        Some(v) if v.is_finite() => v,
        _ => UNDEFINED_RATE,
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_report() -> IntervalReport {
        IntervalReport {
            role: "manager".to_string(),
            pid: 4242,
            first_seen: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_seen: Utc.timestamp_opt(1_700_000_090, 0).unwrap(),
            age: Duration::from_millis(90_500),
            window_rate: Some(0.25),
            standard_dev: None,
            lifetime_rate: Some(f64::NAN),
            current_rate: Some(f64::INFINITY),
            times_restarted: 2,
            virtual_memory_bytes: 1 << 30,
            rss_bytes: 1 << 20,
            rate_histogram: BTreeMap::from([("0-10%".to_string(), 3)]),
        }
    }

    #[test]
    fn test_sanitize_rate() {
        assert_eq!(sanitize_rate(Some(0.5)), 0.5);
        assert_eq!(sanitize_rate(None), UNDEFINED_RATE);
        assert_eq!(sanitize_rate(Some(f64::NAN)), UNDEFINED_RATE);
        assert_eq!(sanitize_rate(Some(f64::NEG_INFINITY)), UNDEFINED_RATE);
    }

    #[test]
    fn test_wire_copy_replaces_undefined_rates() {
        let report = sample_report();
        let wire = report.to_wire();
        assert_eq!(wire.window_rate, 0.25);
        assert_eq!(wire.standard_dev, UNDEFINED_RATE);
        assert_eq!(wire.lifetime_rate, UNDEFINED_RATE);
        assert_eq!(wire.current_rate, UNDEFINED_RATE);
        assert_eq!(wire.age, 90_500_000_000);
        // the source report keeps its original values
        assert!(report.lifetime_rate.unwrap().is_nan());
        assert!(report.standard_dev.is_none());
    }

    #[test]
    fn test_wire_json_field_names() {
        let json = serde_json::to_value(sample_report().to_wire()).unwrap();
        for key in [
            "pid",
            "role",
            "first_seen",
            "last_seen",
            "age",
            "window_rate",
            "standard_dev",
            "lifetime_rate",
            "current_rate",
            "times_restarted",
            "virtual_memory_bytes",
            "rss_bytes",
            "rate_histogram",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["rate_histogram"]["0-10%"], 3);
    }

    #[test]
    fn test_exposition_block() {
        let text = sample_report().to_exposition("bro");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "bro_pid{role=\"manager\"} 4242",
                "bro_process_start_seconds{role=\"manager\"} 1700000000",
                "bro_process_age_seconds{role=\"manager\"} 90",
                "bro_virtual_memory_bytes{role=\"manager\"} 1073741824",
            ]
        );
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_exposition_escapes_role() {
        let mut report = sample_report();
        report.role = "we\"ird".to_string();
        assert!(report
            .to_string()
            .starts_with("procrate_pid{role=\"we\\\"ird\"} 4242"));
    }
}
