//! Metrics endpoint handler for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::sync::PoisonError;
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
///
/// Per-role gauges are rebuilt from the store on every scrape so that roles
/// whose report disappeared do not linger. Concurrent scrapes take turns on
/// the shared gauges.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    // Empty store simply yields no per-role series.
    let reports = state.store.all().unwrap_or_default();

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    {
        let _scrape = state
            .scrape_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        state.metrics.reset();
        for report in &reports {
            state.metrics.set_for_report(report);
        }

        state.exporter.roles_total.set(reports.len() as f64);
        state.exporter.update_from_health(&state.health_stats);
        state
            .exporter
            .scrape_duration
            .set(start.elapsed().as_secs_f64());

        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return Err(MetricsError::EncodingFailed);
        }
    }

    let body = String::from_utf8(buffer).map_err(|e| {
        error!("Metrics output is not valid UTF-8: {}", e);
        MetricsError::EncodingFailed
    })?;

    debug!(
        "Served {} roles in {:.2}ms",
        reports.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{report, state};

    #[tokio::test]
    async fn test_metrics_rebuilt_from_store() {
        let state = state();
        state.store.insert(report("manager", 11));

        let body = metrics_handler(State(state.clone())).await.unwrap();
        assert!(body.contains("procrate_pid{role=\"manager\"} 11"));
        assert!(body.contains("procrate_cpu_rate_window{role=\"manager\"} 0.25"));
        assert!(body.contains("procrate_exporter_roles_total 1"));
        assert!(!body.contains("procrate_cpu_rate_stddev{"));
        assert_eq!(state.health_stats.http_requests(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scrapes_see_every_role() {
        let state = state();
        for i in 0..200 {
            state.store.insert(report(&format!("role-{i:03}"), 1000 + i));
        }

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                let mut partial = 0;
                for _ in 0..25 {
                    let body = metrics_handler(State(state.clone())).await.unwrap();
                    let pids = body
                        .lines()
                        .filter(|l| l.starts_with("procrate_pid{"))
                        .count();
                    if pids != 200 {
                        partial += 1;
                    }
                }
                partial
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), 0);
        }
    }
}
