//! Report endpoints: the sanitized JSON snapshot of the store.
//!
//! - `/report`: all roles, 503 while no report has been stored yet
//! - `/report/{role}`: one role, 404 when the role has no report

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, instrument};

use procrate_exporter::store::StoreError;

use crate::state::SharedState;

/// HTTP mapping for store errors.
pub struct ReportError(StoreError);

impl From<StoreError> for ReportError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Empty => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Serialization(e) => {
                error!("Failed to serialize reports: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.0.to_string()).into_response()
    }
}

fn json(body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Handler for the /report endpoint.
#[instrument(skip(state))]
pub async fn report_handler(State(state): State<SharedState>) -> Result<Response, ReportError> {
    debug!("Processing /report request");
    state.health_stats.record_http_request();

    if state.store.is_empty() {
        return Err(StoreError::Empty.into());
    }
    Ok(json(state.store.to_json()?))
}

/// Handler for the /report/{role} endpoint.
#[instrument(skip(state))]
pub async fn role_report_handler(
    State(state): State<SharedState>,
    Path(role): Path<String>,
) -> Result<Response, ReportError> {
    debug!("Processing /report/{} request", role);
    state.health_stats.record_http_request();

    Ok(json(state.store.role_to_json(&role)?))
}
