//! Per-role process CPU rate monitoring.
//!
//! Processes are grouped into named roles (for example the manager, logger,
//! proxy and worker processes of a cluster). Each sampling tick yields one
//! `ProcessObservation` per role; the `RateComputer` turns consecutive
//! observations into an `IntervalReport` with window, lifetime and current
//! CPU rates. The `ReportScheduler` keeps the latest report per role in a
//! shared `ReportStore` and periodically flushes it as JSON or
//! Prometheus-style text.

pub mod config;
pub mod health_stats;
pub mod histogram;
pub mod metrics;
pub mod monitor;
pub mod process;
pub mod rate;
pub mod replay;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod window;

pub use rate::RateComputer;
pub use report::{IntervalReport, ProcessObservation, WireReport};
pub use store::{ReportStore, StoreError};
