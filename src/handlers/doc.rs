//! Documentation endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /doc endpoint.
#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    let prefix = state.config.metric_prefix();
    let port = state.config.port.unwrap_or(procrate_exporter::config::DEFAULT_PORT);

    let doc = format!(
        r#"PROCRATE EXPORTER - DOCUMENTATION
=================================

VERSION: {version} ({git_sha})
DESCRIPTION: Per-role process CPU rate monitor and Prometheus exporter

HTTP ENDPOINTS
--------------
GET /metrics        - Prometheus metrics endpoint
GET /report         - Latest report for every role (JSON, 503 until the first report)
GET /report/{{role}}  - Latest report for one role (JSON, 404 if unknown)
GET /health         - Health check with internal statistics (plain text)
GET /doc            - This documentation (plain text)

REPORT FIELDS
-------------
role, pid, first_seen, last_seen   - identity and observation times (RFC3339)
age                                - last_seen - first_seen in nanoseconds
window_rate, standard_dev          - mean / stddev of the last N interval rates
lifetime_rate                      - CPU seconds per second since first observed
current_rate                       - CPU rate over the latest interval
times_restarted                    - PID changes since the exporter started
rate_histogram                     - interval counts per CPU rate bucket
Undefined rates are reported as -1.

AVAILABLE METRICS
-----------------
{prefix}_pid                        - PID filling the role
{prefix}_process_start_seconds      - Unix time the process was first observed
{prefix}_process_age_seconds        - Seconds between first and last observation
{prefix}_virtual_memory_bytes       - Virtual memory size
{prefix}_rss_bytes                  - Resident set size
{prefix}_cpu_rate_window            - Sliding window mean CPU rate
{prefix}_cpu_rate_stddev            - Sliding window CPU rate standard deviation
{prefix}_cpu_rate_lifetime          - Lifetime CPU rate
{prefix}_cpu_rate_current           - Latest interval CPU rate
{prefix}_restarts_total             - Process restarts per role
{prefix}_cpu_rate_histogram_intervals - Interval counts per rate bucket
{prefix}_exporter_*                 - Exporter self-metrics

CONFIGURATION
-------------
Config file locations (in order):
1. CLI specified: -c /path/to/config.yaml
2. System config: /etc/procrate/procrate-exporter.yaml
3. Current directory: ./procrate-exporter.yaml

Key configuration options:
- sample_interval_secs: Seconds between samples (default: 10)
- report_interval_secs: Seconds between periodic flushes (default: 30)
- window_size: Interval rates in the sliding window (default: 10)
- histogram_buckets: Upper bounds of the rate buckets
- roles: List of {{role, matches, cmdline_matches}}
- output_format: json | text | none
- output_file: Write snapshots to a file instead of stdout

CLI COMMANDS
------------
procrate-exporter                       - Start the exporter
procrate-exporter check --all           - Validate system requirements
procrate-exporter config -o config.yaml - Generate config file
procrate-exporter test -n 3             - Sample and print reports
procrate-exporter roles                 - List roles and matching processes
procrate-exporter generate-testdata     - Write synthetic replay data

EXAMPLE USAGE
-------------
curl http://localhost:{port}/report
curl http://localhost:{port}/report/worker-1
curl http://localhost:{port}/metrics

EXAMPLE PROMQL QUERIES
----------------------
# Roles running hotter than one core over the window
{prefix}_cpu_rate_window > 1

# Restarts in the last hour
increase({prefix}_restarts_total[1h])

{FOOTER_TEXT}
"#
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
