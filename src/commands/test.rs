//! Test command implementation.
//!
//! Runs the sampling and rate pipeline in the foreground for a few
//! iterations and prints the resulting store.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use procrate_exporter::config::Config;
use procrate_exporter::process::{ProcScanner, ProcessSource};
use procrate_exporter::rate::RateComputer;
use procrate_exporter::report::{IntervalReport, ProcessObservation};
use procrate_exporter::replay::{load_test_data_from_file, ReplaySource};
use procrate_exporter::store::ReportStore;

use crate::cli::ReportFormat;

/// Samples processes and prints the computed reports
pub fn command_test(
    iterations: usize,
    interval: Option<u64>,
    format: ReportFormat,
    config: &Config,
    test_data_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 procrate-exporter - Test Mode");
    println!("================================");

    let source: Box<dyn ProcessSource> = match test_data_file {
        Some(path) => {
            println!("📂 Replaying test data from {}", path.display());
            Box::new(ReplaySource::new(load_test_data_from_file(path)?))
        }
        None => Box::new(ProcScanner::new(config.role_rules())),
    };

    let pause = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.sample_interval());
    let mut computer = RateComputer::new(config.window_size(), config.buckets());
    let store = ReportStore::new();

    for iteration in 1..=iterations {
        if iteration > 1 && test_data_file.is_none() {
            thread::sleep(pause);
        }
        println!("\n🔄 Iteration {}/{}:", iteration, iterations);

        let start = Instant::now();
        let observations = source.sample();
        println!(
            "   ⏱️  Sample duration: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        println!("   📊 Roles observed: {}", observations.len());

        for obs in &observations {
            let report = computer.observe(obs);
            println!("{}", observation_line(obs, report.as_ref()));
            if let Some(report) = report {
                store.insert(report);
            }
        }
    }

    println!("\n📈 Reports:");
    if store.is_empty() {
        println!("   ⚠️  No reports produced");
    } else {
        match format {
            ReportFormat::Json => {
                let json = store.to_json()?;
                println!("{}", String::from_utf8_lossy(&json));
            }
            ReportFormat::Text => print!("{}", store.to_text(config.metric_prefix())),
        }
    }

    println!("\n✅ Test completed successfully");
    Ok(())
}

/// One progress line per observation. `observe` yields no report only when
/// the sample timestamp did not move forward.
fn observation_line(obs: &ProcessObservation, report: Option<&IntervalReport>) -> String {
    match report {
        Some(report) => format!(
            "   ├─ {} (PID: {}) current={}",
            report.role,
            report.pid,
            report
                .current_rate
                .map(|r| format!("{:.3}", r))
                .unwrap_or_else(|| "-".into())
        ),
        None => format!(
            "   ├─ {} (PID: {}) skipped (timestamp did not advance)",
            obs.role, obs.pid
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use procrate_exporter::histogram::HistogramBuckets;

    fn obs(secs: i64, cpu: f64) -> ProcessObservation {
        ProcessObservation {
            role: "proxy".to_string(),
            pid: 77,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            cpu_time_seconds: cpu,
            virtual_memory_bytes: 0,
            rss_bytes: 0,
        }
    }

    #[test]
    fn test_observation_lines() {
        let mut computer = RateComputer::new(4, HistogramBuckets::default());

        let first = obs(0, 1.0);
        let report = computer.observe(&first);
        assert!(report.is_some());
        assert_eq!(
            observation_line(&first, report.as_ref()),
            "   ├─ proxy (PID: 77) current=-"
        );

        let second = obs(10, 3.0);
        let report = computer.observe(&second);
        assert_eq!(
            observation_line(&second, report.as_ref()),
            "   ├─ proxy (PID: 77) current=0.200"
        );

        let stale = obs(10, 4.0);
        let report = computer.observe(&stale);
        assert!(report.is_none());
        assert_eq!(
            observation_line(&stale, report.as_ref()),
            "   ├─ proxy (PID: 77) skipped (timestamp did not advance)"
        );
    }
}
