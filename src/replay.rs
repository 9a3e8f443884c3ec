//! Recorded observation streams.
//!
//! Test data files hold a sequence of frames, one frame per sampling tick.
//! `ReplaySource` feeds them back through the normal pipeline instead of
//! reading /proc; `generate_test_data` produces synthetic files.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::process::ProcessSource;
use crate::report::ProcessObservation;

/// Root structure for test data JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    pub version: String,
    pub generated_at: String,
    pub frames: Vec<Vec<ProcessObservation>>,
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> Result<TestData, std::io::Error> {
    debug!("Loading test data from: {}", path.display());

    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Test data file not found: {}", path.display()),
        ));
    }

    let content = fs::read_to_string(path)?;
    let test_data: TestData = serde_json::from_str(&content).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to parse test data JSON: {}", e),
        )
    })?;

    info!(
        "Loaded test data version {} from {} ({} frames)",
        test_data.version,
        test_data.generated_at,
        test_data.frames.len()
    );

    Ok(test_data)
}

/// Replays recorded frames, one per `sample()` call.
///
/// Timestamps are shifted so the first frame lines up with the moment the
/// source was created; spacing between frames is preserved. Once all frames
/// are consumed the source reports no processes.
pub struct ReplaySource {
    frames: Vec<Vec<ProcessObservation>>,
    cursor: AtomicUsize,
}

impl ReplaySource {
    pub fn new(data: TestData) -> Self {
        Self::rebased(data, Utc::now())
    }

    pub fn rebased(data: TestData, start: DateTime<Utc>) -> Self {
        let origin = data
            .frames
            .iter()
            .flatten()
            .map(|o| o.timestamp)
            .min();

        let frames = match origin {
            Some(origin) => {
                let shift = start - origin;
                data.frames
                    .into_iter()
                    .map(|frame| {
                        frame
                            .into_iter()
                            .map(|mut o| {
                                o.timestamp += shift;
                                o
                            })
                            .collect()
                    })
                    .collect()
            }
            None => data.frames,
        };

        Self {
            frames,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames
            .len()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}

impl ProcessSource for ReplaySource {
    fn sample(&self) -> Vec<ProcessObservation> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        match self.frames.get(idx) {
            Some(frame) => frame.clone(),
            None => {
                if idx == self.frames.len() {
                    info!("Test data exhausted after {} frames", self.frames.len());
                }
                Vec::new()
            }
        }
    }
}

/// Builds a synthetic observation stream.
///
/// Each role runs at its own base CPU rate with jitter; the first role is
/// restarted (new PID, CPU time starting over) halfway through.
pub fn generate_test_data(
    rng: &mut impl Rng,
    roles: &[String],
    frames: usize,
    interval_secs: u64,
) -> TestData {
    struct SimProcess {
        pid: u32,
        rate: f64,
        cpu: f64,
        vmem: u64,
        rss: u64,
    }

    let start = Utc::now();
    let mut sims: Vec<SimProcess> = roles
        .iter()
        .map(|_| {
            // Virtual memory: 100 MB - 2 GB
            let vmem = rng.gen_range(100 * 1024 * 1024..2 * 1024 * 1024 * 1024_u64);
            // RSS: 20-60% of virtual memory
            let rss = (vmem as f64 * rng.gen_range(0.20..0.60)) as u64;
            SimProcess {
                pid: rng.gen_range(1000..60000),
                rate: rng.gen_range(0.02..0.9),
                cpu: rng.gen_range(0.0..500.0),
                vmem,
                rss,
            }
        })
        .collect();

    let restart_at = frames / 2;
    let mut out = Vec::with_capacity(frames);

    for i in 0..frames {
        let timestamp = start + ChronoDuration::seconds((i as u64 * interval_secs) as i64);
        let mut frame = Vec::with_capacity(roles.len());

        for (idx, (role, sim)) in roles.iter().zip(sims.iter_mut()).enumerate() {
            if i > 0 {
                if idx == 0 && i == restart_at {
                    sim.pid += 1;
                    sim.cpu = rng.gen_range(0.0..0.5);
                } else {
                    let jitter: f64 = rng.gen_range(0.8..1.2);
                    sim.cpu += sim.rate * jitter * interval_secs as f64;
                }
                // RSS drifts by up to +/- 1 MB per tick
                let drift = rng.gen_range(0..2 * 1024 * 1024_u64);
                sim.rss = (sim.rss + drift).saturating_sub(1024 * 1024).min(sim.vmem);
            }

            frame.push(ProcessObservation {
                role: role.clone(),
                pid: sim.pid,
                timestamp,
                cpu_time_seconds: sim.cpu,
                virtual_memory_bytes: sim.vmem,
                rss_bytes: sim.rss,
            });
        }
        out.push(frame);
    }

    TestData {
        version: "1.0".to_string(),
        generated_at: start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        frames: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn roles() -> Vec<String> {
        vec!["manager".to_string(), "worker".to_string()]
    }

    #[test]
    fn test_generated_stream_shape() {
        let mut rng = rand::thread_rng();
        let data = generate_test_data(&mut rng, &roles(), 6, 10);
        assert_eq!(data.frames.len(), 6);
        assert!(data.frames.iter().all(|f| f.len() == 2));

        let manager: Vec<&ProcessObservation> =
            data.frames.iter().map(|f| &f[0]).collect();
        assert_ne!(manager[2].pid, manager[3].pid, "first role restarts halfway");
        assert_eq!(manager[3].pid, manager[5].pid);

        let worker: Vec<&ProcessObservation> = data.frames.iter().map(|f| &f[1]).collect();
        for pair in worker.windows(2) {
            assert!(pair[1].cpu_time_seconds >= pair[0].cpu_time_seconds);
            assert_eq!(
                (pair[1].timestamp - pair[0].timestamp).num_seconds(),
                10
            );
            assert!(pair[1].rss_bytes <= pair[1].virtual_memory_bytes);
        }
    }

    #[test]
    fn test_replay_rebases_and_exhausts() {
        let mut rng = rand::thread_rng();
        let data = generate_test_data(&mut rng, &roles(), 3, 5);
        let start = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let source = ReplaySource::rebased(data, start);

        assert_eq!(source.remaining(), 3);
        let first = source.sample();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].timestamp, start);
        let second = source.sample();
        assert_eq!(second[0].timestamp, start + ChronoDuration::seconds(5));
        source.sample();
        assert!(source.sample().is_empty());
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_load_test_data_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdata.json");
        let mut rng = rand::thread_rng();
        let data = generate_test_data(&mut rng, &roles(), 2, 1);
        fs::write(&path, serde_json::to_string_pretty(&data).unwrap()).unwrap();

        let loaded = load_test_data_from_file(&path).unwrap();
        assert_eq!(loaded.frames, data.frames);
        let missing = load_test_data_from_file(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(missing.kind(), std::io::ErrorKind::NotFound);

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{ not json").unwrap();
        let err = load_test_data_from_file(&garbage).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
