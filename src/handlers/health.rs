//! Health check endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str =
    "procrate-exporter: per-role CPU rates - see /doc for endpoints and metrics";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let roles = state.store.len();
    let flush_failed = state.health_stats.last_flush_failed();

    let (status, message) = if roles == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "No reports yet".to_string())
    } else if flush_failed {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Last report flush failed".to_string(),
        )
    } else {
        (StatusCode::OK, format!("OK - {} roles reporting", roles))
    };

    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{FOOTER_TEXT}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{report, state};

    #[tokio::test]
    async fn test_health_status_follows_store_and_flush() {
        let state = state();
        let resp = health_handler(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.store.insert(report("logger", 3));
        let resp = health_handler(State(state.clone())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        state.health_stats.record_flush_failure();
        let resp = health_handler(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
