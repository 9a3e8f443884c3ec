//! HTTP endpoint handlers for the exporter.
//!
//! - `/metrics`: Prometheus metrics endpoint
//! - `/report`, `/report/{role}`: JSON report snapshots
//! - `/health`: Health check endpoint
//! - `/doc`: Documentation endpoint

pub mod doc;
pub mod health;
pub mod metrics;
pub mod report;

// Re-export handlers
pub use doc::doc_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use report::{report_handler, role_report_handler};
